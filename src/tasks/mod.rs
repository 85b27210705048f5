//! Build tasks.
//!
//! Every build task is a linear pipeline over one [`TaskContext`]:
//!
//! 1. select inputs with ordered globs ([`sources`](crate::sources)),
//! 2. dev: drop up-to-date inputs ([`freshness`](crate::freshness));
//!    dist: clean the task's outputs first,
//! 3. transform and write under the target's output root,
//! 4. tell the dev server what changed.
//!
//! Per-file failures go through the context's [`ErrorHandler`] and the task
//! carries on; only errors that make the whole task meaningless (bad globs,
//! an unwritable output directory) are returned as [`TaskError`].

pub mod ftp;
pub mod html;
pub mod media;
pub mod scripts;
pub mod styles;

use crate::config::ConfigError;
use crate::notifier::ErrorHandler;
use crate::project::ProjectMeta;
use crate::server::Reloader;
use crate::settings::BuildSettings;
use crate::sources::SourceError;
use crate::target::{Layout, Target};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ftp(#[from] ftp::FtpError),
}

pub(crate) fn io_at(path: &Path) -> impl FnOnce(io::Error) -> TaskError + '_ {
    move |source| TaskError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Everything a task needs to know about the current run.
pub struct TaskContext {
    pub layout: Layout,
    pub target: Target,
    pub settings: BuildSettings,
    pub project: ProjectMeta,
    pub errors: ErrorHandler,
    reloader: OnceLock<Reloader>,
}

impl TaskContext {
    pub fn new(
        layout: Layout,
        target: Target,
        settings: BuildSettings,
        project: ProjectMeta,
        errors: ErrorHandler,
    ) -> Self {
        Self {
            layout,
            target,
            settings,
            project,
            errors,
            reloader: OnceLock::new(),
        }
    }

    pub fn output(&self) -> &Path {
        self.layout.output(self.target)
    }

    /// Attach a running dev server. Only the first server is kept.
    pub fn attach_reloader(&self, reloader: Reloader) {
        if self.reloader.set(reloader).is_err() {
            tracing::debug!("dev server already attached");
        }
    }

    pub fn reloader(&self) -> Option<&Reloader> {
        self.reloader.get()
    }

    /// Push written files to the dev server, if one is running.
    pub fn reload(&self, written: &[PathBuf]) {
        if written.is_empty() {
            return;
        }
        if let Some(reloader) = self.reloader.get() {
            reloader.changed(self.output(), written);
        }
    }
}

/// What a task did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TaskReport {
    /// Output files written, absolute.
    pub written: Vec<PathBuf>,
    /// Inputs skipped because their outputs were current.
    pub skipped: usize,
    /// Inputs that failed and were reported.
    pub failed: usize,
    /// Bytes saved by compression.
    pub bytes_saved: u64,
    /// Non-fatal findings (lint output).
    pub warnings: Vec<String>,
}

impl TaskReport {
    /// A task "ran" when it produced at least one file.
    pub fn ran(&self) -> bool {
        !self.written.is_empty()
    }

    pub fn merge(&mut self, other: TaskReport) {
        self.written.extend(other.written);
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.bytes_saved += other.bytes_saved;
        self.warnings.extend(other.warnings);
    }
}

/// Write `contents` to `path`, creating parent directories.
pub(crate) fn write_output(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), TaskError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_at(parent))?;
    }
    fs::write(path, contents).map_err(io_at(path))
}

/// Remove everything inside `dir`, keeping `dir` itself. Missing is fine.
pub(crate) fn empty_dir(dir: &Path) -> Result<(), TaskError> {
    clean_except(dir, &[])
}

/// Remove every entry of `dir` whose name is not in `keep`.
pub(crate) fn clean_except(dir: &Path, keep: &[&str]) -> Result<(), TaskError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io_at(dir)(e)),
    };
    for entry in entries {
        let entry = entry.map_err(io_at(dir))?;
        let path = entry.path();
        if keep.iter().any(|k| entry.file_name() == *k) {
            continue;
        }
        let removed = if entry.file_type().map_err(io_at(&path))?.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(io_at(&path))?;
    }
    Ok(())
}

/// Remove a single file if present.
pub(crate) fn remove_file(path: &Path) -> Result<(), TaskError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(io_at(path)(e)),
        _ => Ok(()),
    }
}
