//! CLI output formatting for task runs.
//!
//! Logs (via `tracing`) carry per-file decisions; this module prints the
//! human summary a developer reads after each task. Files are shown relative
//! to the output root they were written under.
//!
//! # Output Format
//!
//! ## Build tasks
//!
//! ```text
//! Styles → dev
//!     assets/styles/modern.css
//!     assets/styles/print.css
//!     3 up to date, 1 failed
//! Scripts → dev
//!     warning: src/assets/scripts/a.js:2:5: Identifier `x` has already been declared
//! Media → dist
//!     assets/media/hero.jpg
//!     saved 48.2 KB
//! HTML → dev: up to date
//! ```
//!
//! ## Watch / sync
//!
//! ```text
//! Serving at http://localhost:3000/
//! Changed: src/index.html, src/partials/head.html
//! ```
//!
//! # Architecture
//!
//! Each event has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::runner::TaskName;
use crate::target::Target;
use crate::tasks::TaskReport;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count (`512 B`, `48.2 KB`, `1.3 MB`).
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

pub fn format_task_report(
    task: TaskName,
    target: Target,
    output_root: &Path,
    report: &TaskReport,
) -> Vec<String> {
    let header = format!("{} → {target}", task.label());
    if !report.ran() && report.failed == 0 && report.warnings.is_empty() {
        return vec![format!("{header}: up to date")];
    }

    let mut lines = vec![header];
    for path in &report.written {
        lines.push(format!("{}{}", indent(1), relative_display(output_root, path)));
    }
    for warning in &report.warnings {
        lines.push(format!("{}warning: {warning}", indent(1)));
    }

    let mut tail = Vec::new();
    if report.skipped > 0 {
        tail.push(format!("{} up to date", report.skipped));
    }
    if report.failed > 0 {
        tail.push(format!("{} failed", report.failed));
    }
    if report.bytes_saved > 0 {
        tail.push(format!("saved {}", format_bytes(report.bytes_saved)));
    }
    if !tail.is_empty() {
        lines.push(format!("{}{}", indent(1), tail.join(", ")));
    }
    lines
}

pub fn print_task_report(task: TaskName, target: Target, output_root: &Path, report: &TaskReport) {
    for line in format_task_report(task, target, output_root, report) {
        println!("{line}");
    }
}

pub fn format_server_started(address: SocketAddr) -> String {
    let host = if address.ip().is_unspecified() {
        "localhost".to_string()
    } else {
        address.ip().to_string()
    };
    format!("Serving at http://{host}:{}/", address.port())
}

pub fn print_server_started(address: SocketAddr) {
    println!("{}", format_server_started(address));
}

pub fn format_changes(root: &Path, changed: &[PathBuf]) -> String {
    let names: Vec<String> = changed.iter().map(|p| relative_display(root, p)).collect();
    format!("Changed: {}", names.join(", "))
}

pub fn print_changes(root: &Path, changed: &[PathBuf]) {
    println!("{}", format_changes(root, changed));
}
