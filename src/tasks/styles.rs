//! Styles task: SCSS → prefixed CSS.
//!
//! Each non-partial `assets/styles/*.scss` is an entry point compiled to
//! `assets/styles/<stem>.css`:
//!
//! 1. `grass` compiles the SCSS (compressed in dist),
//! 2. `lightningcss` adds vendor prefixes for `styles.browsers`,
//! 3. every `display: flex` / `display: inline-flex` declaration gets a
//!    `-js-display` twin in front of it for the flexibility polyfill.
//!
//! Freshness is all-or-nothing against `modern.css`, with every SCSS file
//! (partials included) as an extra dependency.

use super::{TaskContext, TaskError, TaskReport, empty_dir, write_output};
use crate::freshness::{Destination, filter_newer};
use crate::sources::resolve;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

const STYLES_SRC: &str = "assets/styles";
const ENTRY_PATTERNS: &[&str] = &["*.scss", "!_*.scss"];
const EXTRA_PATTERNS: &[&str] = &["**/*.scss"];
const FRESHNESS_REFERENCE: &str = "modern.css";

static FLEX_DISPLAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<delim>[{;])(?P<ws>\s*)display(?P<colon>\s*:\s*)(?P<value>inline-flex|flex)\b")
        .expect("valid display regex")
});

#[derive(Error, Debug)]
pub enum StyleError {
    #[error("{0}")]
    Sass(String),
    #[error("Invalid browser query: {0}")]
    Browsers(String),
    #[error("CSS processing failed: {0}")]
    Css(String),
}

/// Compile one SCSS entry point to its final CSS.
pub fn compile(path: &Path, browsers: &[String], compressed: bool) -> Result<String, StyleError> {
    let style = if compressed {
        grass::OutputStyle::Compressed
    } else {
        grass::OutputStyle::Expanded
    };
    let css = grass::from_path(path, &grass::Options::default().style(style))
        .map_err(|e| StyleError::Sass(e.to_string()))?;
    let prefixed = autoprefix(&css, browsers, compressed)?;
    Ok(insert_flexibility(&prefixed))
}

/// Add vendor prefixes required by `browsers`.
pub fn autoprefix(css: &str, browsers: &[String], minify: bool) -> Result<String, StyleError> {
    let browsers =
        Browsers::from_browserslist(browsers).map_err(|e| StyleError::Browsers(e.to_string()))?;
    let targets = Targets {
        browsers,
        ..Targets::default()
    };

    let mut sheet = StyleSheet::parse(css, ParserOptions::default())
        .map_err(|e| StyleError::Css(e.to_string()))?;
    sheet
        .minify(MinifyOptions {
            targets,
            ..MinifyOptions::default()
        })
        .map_err(|e| StyleError::Css(e.to_string()))?;
    let printed = sheet
        .to_css(PrinterOptions {
            minify,
            targets,
            ..PrinterOptions::default()
        })
        .map_err(|e| StyleError::Css(e.to_string()))?;
    Ok(printed.code)
}

/// Put `-js-display: <value>` before every flex display declaration.
pub fn insert_flexibility(css: &str) -> String {
    FLEX_DISPLAY
        .replace_all(
            css,
            "${delim}${ws}-js-display${colon}${value};${ws}display${colon}${value}",
        )
        .into_owned()
}

fn css_name(entry: &Path) -> PathBuf {
    let stem = entry.file_stem().unwrap_or_default();
    PathBuf::from(stem).with_extension("css")
}

pub fn run(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    let target = ctx.target;
    let styles_src = ctx.layout.src().join(STYLES_SRC);
    let out_dir = ctx.layout.styles_dir(target);

    if target.cleans_output() {
        empty_dir(&out_dir)?;
    }

    let entries = resolve(&styles_src, ENTRY_PATTERNS)?;
    let count = entries.len();
    let entries = if target.skips_unchanged() {
        let extras: Vec<PathBuf> = resolve(&styles_src, EXTRA_PATTERNS)?
            .into_iter()
            .map(|f| f.path)
            .collect();
        filter_newer(
            entries,
            Destination::Single(&out_dir.join(FRESHNESS_REFERENCE)),
            &extras,
        )
    } else {
        entries
    };

    let mut report = TaskReport {
        skipped: count - entries.len(),
        ..Default::default()
    };
    let browsers = &ctx.settings.styles.browsers;

    for entry in entries {
        let output = out_dir.join(css_name(&entry.relative));
        match compile(&entry.path, browsers, target.minifies()) {
            Ok(css) => {
                write_output(&output, css)?;
                tracing::info!(file = %entry.relative.display(), %target, "styles");
                report.written.push(output);
            }
            Err(e) => {
                report.failed += 1;
                ctx.errors
                    .report(&format!("{}: {e}", entry.path.display()));
            }
        }
    }

    ctx.reload(&report.written);
    Ok(report)
}
