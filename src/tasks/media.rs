//! Media task: compress images and copy other media.
//!
//! Inputs are everything under `assets/media/` plus the project
//! `screenshot.png`. JPEG and PNG files go through the
//! [`ImageCompressor`]; anything else (SVG, video, fonts) is copied as is.
//! Work fans out over the global rayon pool.

use super::{TaskContext, TaskError, TaskReport, empty_dir, remove_file};
use crate::freshness::{Destination, filter_newer};
use crate::imaging::{BackendError, CompressParams, ImageCompressor, ImageKind, Quality};
use crate::sources::{SourceFile, resolve};
use rayon::prelude::*;
use std::fs;
use std::path::PathBuf;

const MEDIA_GLOB: &str = "assets/media/**/*";
const SCREENSHOT: &str = "screenshot.png";

struct Job {
    source: SourceFile,
    output: PathBuf,
}

pub fn run(ctx: &TaskContext, compressor: &dyn ImageCompressor) -> Result<TaskReport, TaskError> {
    let target = ctx.target;
    let src = ctx.layout.src();
    let media_dir = ctx.layout.media_dir(target);
    let output_root = ctx.output();

    if target.cleans_output() {
        empty_dir(&media_dir)?;
        remove_file(&ctx.layout.screenshot(target))?;
    }

    let media = resolve(src, &[MEDIA_GLOB])?;
    let screenshot = resolve(src, &[SCREENSHOT])?;
    let total = media.len() + screenshot.len();

    let (media, screenshot) = if target.skips_unchanged() {
        (
            filter_newer(media, Destination::Mirror(&media_dir), &[]),
            filter_newer(screenshot, Destination::Mirror(output_root), &[]),
        )
    } else {
        (media, screenshot)
    };

    let jobs: Vec<Job> = media
        .into_iter()
        .map(|source| Job {
            output: source.destination(&media_dir),
            source,
        })
        .chain(screenshot.into_iter().map(|source| Job {
            output: source.destination(output_root),
            source,
        }))
        .collect();

    let mut report = TaskReport {
        skipped: total - jobs.len(),
        ..Default::default()
    };
    if jobs.is_empty() {
        tracing::debug!("media: nothing to do");
        return Ok(report);
    }
    tracing::info!(files = jobs.len(), %target, "media");

    let quality = Quality::new(ctx.settings.media.jpeg_quality);
    let results: Vec<(&Job, Result<u64, BackendError>)> = jobs
        .par_iter()
        .map(|job| (job, process_one(job, compressor, quality)))
        .collect();

    for (job, result) in results {
        match result {
            Ok(saved) => {
                tracing::debug!(file = %job.source.relative.display(), saved, "media written");
                report.bytes_saved += saved;
                report.written.push(job.output.clone());
            }
            Err(e) => {
                report.failed += 1;
                ctx.errors
                    .report(&format!("{}: {e}", job.source.path.display()));
            }
        }
    }

    ctx.reload(&report.written);
    Ok(report)
}

fn process_one(
    job: &Job,
    compressor: &dyn ImageCompressor,
    quality: Quality,
) -> Result<u64, BackendError> {
    if let Some(parent) = job.output.parent() {
        fs::create_dir_all(parent)?;
    }
    match ImageKind::from_path(&job.source.path) {
        Some(kind) => {
            let outcome = compressor.compress(&CompressParams {
                source: job.source.path.clone(),
                output: job.output.clone(),
                kind,
                quality,
            })?;
            Ok(outcome.saved_bytes())
        }
        None => {
            fs::copy(&job.source.path, &job.output)?;
            Ok(0)
        }
    }
}
