//! Shared test utilities for the sitepipe test suite.
//!
//! Provides a throwaway project tree, a [`TaskContext`] wired to a recording
//! notifier, and scripted stand-ins for the interactive and network seams
//! (`Prompter`, `Notifier`, FTP `Connector`).
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let project = TestProject::new();
//! project.file("src/index.html", "<h1>@@name</h1>");
//! let (ctx, notes) = recording_context(&project, Target::Dev);
//!
//! html::run(&ctx).unwrap();
//! assert!(notes.messages().is_empty());
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use crate::config::{ConfigError, FtpCredentials, Prompter};
use crate::notifier::{ErrorHandler, Notification, Notifier};
use crate::project::ProjectMeta;
use crate::settings::BuildSettings;
use crate::target::{Layout, Target};
use crate::tasks::TaskContext;
use crate::tasks::ftp::{Connector, FtpError, RemoteStore};

// =========================================================================
// Project fixture
// =========================================================================

/// A project root in a temp directory.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Write a text file, creating parents.
    pub fn file(&self, rel: &str, content: &str) -> PathBuf {
        self.bytes(rel, content.as_bytes())
    }

    pub fn bytes(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    /// Write a file whose mtime is `age_secs` in the past.
    pub fn file_aged(&self, rel: &str, content: &str, age_secs: u64) -> PathBuf {
        let path = self.file(rel, content);
        let when = SystemTime::now() - Duration::from_secs(age_secs);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(when)
            .unwrap();
        path
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).unwrap()
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// A task context over `project` with stock settings whose notifications are
/// captured instead of shown.
pub fn recording_context(
    project: &TestProject,
    target: Target,
) -> (TaskContext, Arc<RecordingNotifier>) {
    let settings = BuildSettings::default();
    let layout = Layout::new(project.root(), &settings.paths);
    let meta = ProjectMeta::load(layout.package_file());
    let notes = Arc::new(RecordingNotifier::default());
    let ctx = TaskContext::new(
        layout,
        target,
        settings,
        meta,
        ErrorHandler::new(notes.clone()),
    );
    (ctx, notes)
}

// =========================================================================
// Notifier
// =========================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) {
        self.sent.lock().unwrap().push(notification.clone());
    }
}

// =========================================================================
// Prompter
// =========================================================================

/// Answers prompts from a fixed script. An empty (or missing) answer keeps
/// the offered default.
pub struct ScriptedPrompter {
    answers: Mutex<Vec<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().rev().map(|a| a.to_string()).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Prompt messages in the order they were shown.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }

    fn answer(&self, message: &str, default: &str) -> String {
        self.asked.lock().unwrap().push(message.to_string());
        match self.answers.lock().unwrap().pop() {
            Some(a) if !a.is_empty() => a,
            _ => default.to_string(),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn input(&self, message: &str, default: &str) -> Result<String, ConfigError> {
        Ok(self.answer(message, default))
    }

    fn password(&self, message: &str, default: &str) -> Result<String, ConfigError> {
        Ok(self.answer(message, default))
    }
}

// =========================================================================
// FTP
// =========================================================================

#[derive(Default)]
struct RemoteLog {
    puts: Vec<String>,
    dirs: Vec<String>,
    connections: usize,
}

/// In-memory FTP server. Records every session, directory and upload.
#[derive(Default)]
pub struct MockConnector {
    log: Arc<Mutex<RemoteLog>>,
    failing: Vec<String>,
}

impl MockConnector {
    /// Uploads to `remote_path` fail with a protocol error.
    pub fn failing_on(remote_path: &str) -> Self {
        Self {
            failing: vec![remote_path.to_string()],
            ..Default::default()
        }
    }

    /// Successful uploads in order.
    pub fn puts(&self) -> Vec<String> {
        self.log.lock().unwrap().puts.clone()
    }

    pub fn dirs(&self) -> Vec<String> {
        self.log.lock().unwrap().dirs.clone()
    }

    pub fn connections(&self) -> usize {
        self.log.lock().unwrap().connections
    }
}

impl Connector for MockConnector {
    fn connect(&self, credentials: &FtpCredentials) -> Result<Box<dyn RemoteStore>, FtpError> {
        if credentials.host.is_empty() {
            return Err(FtpError::MissingHost);
        }
        self.log.lock().unwrap().connections += 1;
        Ok(Box::new(MockRemote {
            log: Arc::clone(&self.log),
            failing: self.failing.clone(),
        }))
    }
}

struct MockRemote {
    log: Arc<Mutex<RemoteLog>>,
    failing: Vec<String>,
}

impl RemoteStore for MockRemote {
    fn mkdir_all(&mut self, dir: &str) -> Result<(), FtpError> {
        self.log.lock().unwrap().dirs.push(dir.to_string());
        Ok(())
    }

    fn put(&mut self, path: &str, _data: &[u8]) -> Result<(), FtpError> {
        if self.failing.iter().any(|f| f == path) {
            return Err(FtpError::Upload {
                path: path.to_string(),
                source: suppaftp::FtpError::BadResponse,
            });
        }
        self.log.lock().unwrap().puts.push(path.to_string());
        Ok(())
    }

    fn quit(&mut self) -> Result<(), FtpError> {
        Ok(())
    }
}
