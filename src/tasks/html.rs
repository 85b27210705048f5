//! HTML task: templated copy of everything outside `assets/`.
//!
//! Every file under the source root except `screenshot.png` and `assets/**`
//! is mirrored into the output root. Text files go through the
//! [`template`](crate::template) engine with the project metadata as root
//! context; binary files are copied untouched. Partials are mirrored too, so
//! they stay previewable on their own.

use super::{TaskContext, TaskError, TaskReport, clean_except, io_at, write_output};
use crate::freshness::{Destination, filter_newer};
use crate::sources::{SourceFile, resolve};
use crate::template::{self, TemplateError};
use std::fs;
use std::path::PathBuf;

const PATTERNS: &[&str] = &["**/*", "!screenshot.png", "!assets", "!assets/**"];
const EXTRA_PATTERNS: &[&str] = &["partials/**/*"];
/// Output entries a dist clean leaves alone (owned by the media, scripts and
/// styles tasks, which may be writing them concurrently).
const KEEP_ON_CLEAN: &[&str] = &["assets", "screenshot.png"];

pub fn run(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    let target = ctx.target;
    let src = ctx.layout.src();
    let out = ctx.output();

    if target.cleans_output() {
        clean_except(out, KEEP_ON_CLEAN)?;
    }

    let files = resolve(src, PATTERNS)?;
    let count = files.len();
    let files = if target.skips_unchanged() {
        let extras: Vec<PathBuf> = resolve(src, EXTRA_PATTERNS)?
            .into_iter()
            .map(|f| f.path)
            .collect();
        filter_newer(files, Destination::Mirror(out), &extras)
    } else {
        files
    };

    let mut report = TaskReport {
        skipped: count - files.len(),
        ..Default::default()
    };
    let context = ctx.project.template_context();

    for file in files {
        let output = file.destination(out);
        match render(&file, &context) {
            Ok(bytes) => {
                write_output(&output, bytes)?;
                tracing::debug!(file = %file.relative.display(), "html written");
                report.written.push(output);
            }
            Err(RenderError::Template(e)) => {
                report.failed += 1;
                ctx.errors.report(&e);
            }
            Err(RenderError::Task(e)) => return Err(e),
        }
    }

    if report.ran() {
        tracing::info!(files = report.written.len(), %target, "html");
    }
    ctx.reload(&report.written);
    Ok(report)
}

enum RenderError {
    Template(TemplateError),
    Task(TaskError),
}

fn render(
    file: &SourceFile,
    context: &serde_json::Map<String, serde_json::Value>,
) -> Result<Vec<u8>, RenderError> {
    let bytes = fs::read(&file.path).map_err(|e| RenderError::Task(io_at(&file.path)(e)))?;
    match template::as_text(&bytes) {
        Some(text) => template::render(text, &file.path, context)
            .map(String::into_bytes)
            .map_err(RenderError::Template),
        None => Ok(bytes),
    }
}
