//! Local configuration record (`config.json`).
//!
//! Holds FTP credentials per build target and the dev server options. The
//! file is created with empty fields on first use and filled in interactively:
//!
//! ```json
//! {
//!   "ftp": {
//!     "dev":  {"host": "", "user": "", "pass": "", "path": ""},
//!     "dist": {"host": "", "user": "", "pass": "", "path": ""}
//!   },
//!   "browsersync": {"proxy": "", "port": "", "open": "", "notify": ""}
//! }
//! ```
//!
//! ## When prompts happen
//!
//! Each section is prompted independently, only when it is about to be used
//! and is either incomplete or explicitly forced:
//!
//! | Section | Prompted when |
//! |---------|---------------|
//! | `ftp.<target>` | `--all`, or (`ftp` is scheduled or `--ftp`) and (`--config` or any field empty) |
//! | `browsersync` | `--all`, or (`sync` is scheduled or `--sync`) and (`--config` or any field empty) |
//!
//! Prompts go through the [`Prompter`] trait so the gating can be tested with
//! scripted answers.

use crate::target::Target;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error in config record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Prompt failed: {0}")]
    Prompt(String),
}

/// The whole persisted record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub ftp: FtpTargets,
    pub browsersync: BrowserSyncSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FtpTargets {
    pub dev: FtpCredentials,
    pub dist: FtpCredentials,
}

impl FtpTargets {
    pub fn for_target(&self, target: Target) -> &FtpCredentials {
        match target {
            Target::Dev => &self.dev,
            Target::Dist => &self.dist,
        }
    }

    pub fn for_target_mut(&mut self, target: Target) -> &mut FtpCredentials {
        match target {
            Target::Dev => &mut self.dev,
            Target::Dist => &mut self.dist,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FtpCredentials {
    pub host: String,
    pub user: String,
    pub pass: String,
    /// Remote directory uploads land in.
    pub path: String,
}

impl FtpCredentials {
    pub fn is_complete(&self) -> bool {
        [&self.host, &self.user, &self.pass, &self.path]
            .iter()
            .all(|v| !v.is_empty())
    }
}

/// Dev server options. Stored as strings, parsed where they are used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSyncSettings {
    /// Upstream URL to proxy; empty serves the build directory directly.
    pub proxy: String,
    pub port: String,
    /// `local`/`true`, `external`, or anything else for no browser.
    pub open: String,
    /// `true` shows an in-page toast on every reload.
    pub notify: String,
}

impl BrowserSyncSettings {
    pub fn is_complete(&self) -> bool {
        [&self.proxy, &self.port, &self.open, &self.notify]
            .iter()
            .all(|v| !v.is_empty())
    }
}

impl LocalConfig {
    /// Read the record. Missing keys come back as empty strings.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Read the record, creating it with empty fields if it does not exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::load(path);
        }
        tracing::info!(path = %path.display(), "creating empty config record");
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Interactive question source.
pub trait Prompter: Send + Sync {
    /// Ask for a free-text value, pre-filled with `default`.
    fn input(&self, message: &str, default: &str) -> Result<String, ConfigError>;

    /// Ask for a secret. An empty answer keeps `default`.
    fn password(&self, message: &str, default: &str) -> Result<String, ConfigError>;
}

/// Terminal prompts via `dialoguer`.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn input(&self, message: &str, default: &str) -> Result<String, ConfigError> {
        dialoguer::Input::<String>::new()
            .with_prompt(message)
            .default(default.to_string())
            .allow_empty(true)
            .interact_text()
            .map_err(|e| ConfigError::Prompt(e.to_string()))
    }

    fn password(&self, message: &str, default: &str) -> Result<String, ConfigError> {
        let prompt = if default.is_empty() {
            message.to_string()
        } else {
            format!("{message} (leave empty to keep current)")
        };
        let answer = dialoguer::Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .map_err(|e| ConfigError::Prompt(e.to_string()))?;
        Ok(if answer.is_empty() {
            default.to_string()
        } else {
            answer
        })
    }
}

/// What the current run needs from the record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigRequest {
    /// `ftp` is part of the task sequence, or `--ftp` was passed.
    pub ftp_requested: bool,
    /// `sync` is part of the task sequence, or `--sync` was passed.
    pub sync_requested: bool,
    /// `--config`: re-prompt requested sections even when complete.
    pub force: bool,
    /// `--all`: prompt every section of the current target.
    pub all: bool,
}

impl ConfigRequest {
    pub fn should_prompt_ftp(&self, creds: &FtpCredentials) -> bool {
        self.all || (self.ftp_requested && (self.force || !creds.is_complete()))
    }

    pub fn should_prompt_browsersync(&self, settings: &BrowserSyncSettings) -> bool {
        self.all || (self.sync_requested && (self.force || !settings.is_complete()))
    }
}

/// Load (or create) the record and prompt for whatever the request requires.
///
/// Answers are written back after each prompted section.
pub fn configure(
    path: &Path,
    target: Target,
    request: ConfigRequest,
    prompter: &dyn Prompter,
) -> Result<LocalConfig, ConfigError> {
    let mut config = LocalConfig::load_or_create(path)?;

    if request.should_prompt_ftp(config.ftp.for_target(target)) {
        tracing::debug!(%target, "prompting for FTP settings");
        let current = config.ftp.for_target(target).clone();
        let answers = FtpCredentials {
            host: prompter.input("FTP hostname:", &current.host)?,
            user: prompter.input("FTP username:", &current.user)?,
            pass: prompter.password("FTP password:", &current.pass)?,
            path: prompter.input("FTP remote path:", &current.path)?,
        };
        *config.ftp.for_target_mut(target) = answers;
        config.save(path)?;
    }

    if request.should_prompt_browsersync(&config.browsersync) {
        tracing::debug!("prompting for dev server settings");
        let current = config.browsersync.clone();
        config.browsersync = BrowserSyncSettings {
            proxy: prompter.input("Browsersync proxy:", &current.proxy)?,
            port: prompter.input("Browsersync port:", &current.port)?,
            open: prompter.input("Browsersync open:", &current.open)?,
            notify: prompter.input("Browsersync notify:", &current.notify)?,
        };
        config.save(path)?;
    }

    Ok(config)
}
