//! Scripts task: lint first-party scripts and build the four bundles.
//!
//! | Bundle | Inputs (under `assets/scripts/`) | Transpiled |
//! |---|---|---|
//! | `vendor.js` | `vendor/jquery.min.js`, `vendor/bootstrap.min.js`, `vendor/*.js` | no |
//! | `critical.js` | `critical/loadCSS.js`, `critical/loadCSS.cssrelpreload.js` | yes |
//! | `modern.js` | `vendor.*.js`, `jquery.*.js`, `*.js` | yes |
//! | `legacy.js` | `legacy/**/*` | yes |
//!
//! Lint findings are warnings only. A bundle whose sources fail to compile is
//! reported and left unwritten; the other bundles still build.

use super::{TaskContext, TaskError, TaskReport, empty_dir, write_output};
use crate::freshness::{Destination, filter_newer};
use crate::javascript::{BundleOptions, build_bundle, lint_file};
use crate::sources::resolve;

const SCRIPTS_SRC: &str = "assets/scripts";
const LINT_PATTERNS: &[&str] = &["*.js", "!vendor.*.js"];
/// Lint freshness is measured against this bundle.
const LINT_REFERENCE: &str = "modern.js";

struct BundleSpec {
    name: &'static str,
    patterns: &'static [&'static str],
    transpile: bool,
}

const BUNDLES: &[BundleSpec] = &[
    BundleSpec {
        name: "vendor.js",
        patterns: &[
            "vendor/jquery.min.js",
            "vendor/bootstrap.min.js",
            "vendor/*.js",
        ],
        transpile: false,
    },
    BundleSpec {
        name: "critical.js",
        patterns: &["critical/loadCSS.js", "critical/loadCSS.cssrelpreload.js"],
        transpile: true,
    },
    BundleSpec {
        name: "modern.js",
        patterns: &["vendor.*.js", "jquery.*.js", "*.js"],
        transpile: true,
    },
    BundleSpec {
        name: "legacy.js",
        patterns: &["legacy/**/*"],
        transpile: true,
    },
];

pub fn run(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    let target = ctx.target;
    let scripts_src = ctx.layout.src().join(SCRIPTS_SRC);
    let out_dir = ctx.layout.scripts_dir(target);

    if target.cleans_output() {
        empty_dir(&out_dir)?;
    }

    let mut report = TaskReport::default();
    lint(ctx, &scripts_src, &out_dir, &mut report)?;

    for bundle in BUNDLES {
        let sources = resolve(&scripts_src, bundle.patterns)?;
        if sources.is_empty() {
            tracing::debug!(bundle = bundle.name, "no sources, skipping");
            continue;
        }
        let output = out_dir.join(bundle.name);
        let count = sources.len();
        let sources = if target.skips_unchanged() {
            filter_newer(sources, Destination::Single(&output), &[])
        } else {
            sources
        };
        if sources.is_empty() {
            tracing::debug!(bundle = bundle.name, "up to date");
            report.skipped += count;
            continue;
        }

        let options = BundleOptions {
            transpile: bundle.transpile,
            minify: target.minifies(),
            source_map: target.writes_source_maps(),
        };
        match build_bundle(&sources, &options) {
            Ok(code) => {
                write_output(&output, code)?;
                tracing::info!(bundle = bundle.name, files = count, %target, "scripts");
                report.written.push(output);
            }
            Err(e) => {
                report.failed += 1;
                ctx.errors.report(&format!("{}: {e}", bundle.name));
            }
        }
    }

    ctx.reload(&report.written);
    Ok(report)
}

fn lint(
    ctx: &TaskContext,
    scripts_src: &std::path::Path,
    out_dir: &std::path::Path,
    report: &mut TaskReport,
) -> Result<(), TaskError> {
    let files = resolve(scripts_src, LINT_PATTERNS)?;
    let files = if ctx.target.skips_unchanged() {
        filter_newer(files, Destination::Single(&out_dir.join(LINT_REFERENCE)), &[])
    } else {
        files
    };

    for file in files {
        match lint_file(&file.path) {
            Ok(findings) => {
                for finding in findings {
                    tracing::warn!("{finding}");
                    report.warnings.push(finding.to_string());
                }
            }
            Err(e) => ctx.errors.report(&e),
        }
    }
    Ok(())
}
