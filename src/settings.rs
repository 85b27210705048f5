//! Build settings module.
//!
//! Handles loading, validating, and merging the optional `sitepipe.toml`
//! project file. Stock defaults describe the conventional layout; a user file
//! only needs the keys it wants to change.
//!
//! ## Settings Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [paths]
//! src = "src"                  # Source tree
//! dev = "dev"                  # Development build output
//! dist = "dist"                # Production build output
//! config = "config.json"       # Credentials + dev server record
//! package = "package.json"     # Project metadata for HTML variables
//!
//! [styles]
//! browsers = ["last 2 versions", "ie 8", "ie 9"]
//!
//! [media]
//! jpeg_quality = 85            # JPEG re-encode quality (1-100)
//!
//! [processing]
//! max_processes = 4            # Max parallel workers (omit for auto = CPU cores)
//!
//! [watch]
//! debounce_ms = 200            # Quiet period before a rebuild fires
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of the project settings file, looked up in the project root.
pub const SETTINGS_FILENAME: &str = "sitepipe.toml";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Settings validation error: {0}")]
    Validation(String),
}

/// Build settings loaded from `sitepipe.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSettings {
    /// Source, output and record file locations.
    pub paths: PathsConfig,
    /// Autoprefixer browser targets.
    pub styles: StylesConfig,
    /// Image compression settings.
    pub media: MediaConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
    /// File watcher settings.
    pub watch: WatchConfig,
}

impl BuildSettings {
    /// Validate values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.media.jpeg_quality == 0 || self.media.jpeg_quality > 100 {
            return Err(SettingsError::Validation(
                "media.jpeg_quality must be 1-100".into(),
            ));
        }
        if self.styles.browsers.is_empty() {
            return Err(SettingsError::Validation(
                "styles.browsers must not be empty".into(),
            ));
        }
        if self.paths.dev == self.paths.dist {
            return Err(SettingsError::Validation(
                "paths.dev and paths.dist must differ".into(),
            ));
        }
        if self.paths.src == self.paths.dev || self.paths.src == self.paths.dist {
            return Err(SettingsError::Validation(
                "paths.src must differ from the output directories".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub src: String,
    pub dev: String,
    pub dist: String,
    pub config: String,
    pub package: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            src: "src".to_string(),
            dev: "dev".to_string(),
            dist: "dist".to_string(),
            config: "config.json".to_string(),
            package: "package.json".to_string(),
        }
    }
}

/// Styles settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StylesConfig {
    /// Browserslist queries the autoprefixer targets.
    pub browsers: Vec<String>,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            browsers: vec![
                "last 2 versions".to_string(),
                "ie 8".to_string(),
                "ie 9".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediaConfig {
    /// JPEG re-encode quality (1 = worst, 100 = best).
    pub jpeg_quality: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self { jpeg_quality: 85 }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel media workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from settings.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Quiet period in milliseconds before a batch of changes triggers a rebuild.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 200 }
    }
}

// =============================================================================
// Settings loading, merging, and validation
// =============================================================================

/// Returns the stock default settings as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(BuildSettings::default()).expect("default settings must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `sitepipe.toml` from the project root as a raw TOML value.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn load_raw_settings(root: &Path) -> Result<Option<toml::Value>, SettingsError> {
    let path = root.join(SETTINGS_FILENAME);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_settings(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<BuildSettings, SettingsError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let settings: BuildSettings = merged.try_into()?;
    settings.validate()?;
    Ok(settings)
}

/// Load settings for a project root: stock defaults with the user's file on top.
pub fn load_settings(root: &Path) -> Result<BuildSettings, SettingsError> {
    resolve_settings(stock_defaults_value(), load_raw_settings(root)?)
}

/// Returns a fully-commented stock `sitepipe.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_settings_toml() -> &'static str {
    r##"# sitepipe build settings
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Paths (relative to the project root)
# ---------------------------------------------------------------------------
[paths]
# Source tree every task reads from.
src = "src"
# Development build output (default target).
dev = "dev"
# Production build output (selected with --dist).
dist = "dist"
# FTP credentials and dev server options, prompted on first use.
config = "config.json"
# Project metadata exposed to HTML as @@name, @@version, ...
package = "package.json"

# ---------------------------------------------------------------------------
# Styles
# ---------------------------------------------------------------------------
[styles]
# Browserslist queries used for vendor prefixing.
browsers = ["last 2 versions", "ie 8", "ie 9"]

# ---------------------------------------------------------------------------
# Media
# ---------------------------------------------------------------------------
[media]
# JPEG re-encode quality (1 = worst, 100 = best). PNGs are recompressed
# losslessly. The original is kept whenever it is already smaller.
jpeg_quality = 85

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel media workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Watch
# ---------------------------------------------------------------------------
[watch]
# Quiet period (milliseconds) before a batch of changes triggers a rebuild.
debounce_ms = 200
"##
}
