//! Build targets and the directory layout they select.
//!
//! Every task writes under the output root of the current [`Target`]:
//!
//! ```text
//! src/                     dev/ or dist/
//! ├── assets/media/   →    ├── assets/media/
//! ├── assets/scripts/ →    ├── assets/scripts/{vendor,critical,modern,legacy}.js
//! ├── assets/styles/  →    ├── assets/styles/*.css
//! ├── screenshot.png  →    ├── screenshot.png
//! └── everything else →    └── (templated HTML and friends)
//! ```
//!
//! The target also decides the pipeline branches: dev builds skip files whose
//! outputs are already up to date and keep source maps; dist builds clean their
//! outputs first, rebuild everything, and minify.

use crate::settings::PathsConfig;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Dev,
    Dist,
}

impl Target {
    /// `--dist` selects the production target.
    pub fn from_flag(dist: bool) -> Self {
        if dist { Target::Dist } else { Target::Dev }
    }

    pub fn name(self) -> &'static str {
        match self {
            Target::Dev => "dev",
            Target::Dist => "dist",
        }
    }

    /// Dev builds only process sources newer than their outputs.
    pub fn skips_unchanged(self) -> bool {
        self == Target::Dev
    }

    /// Dist builds wipe each task's output before rebuilding it.
    pub fn cleans_output(self) -> bool {
        self == Target::Dist
    }

    pub fn minifies(self) -> bool {
        self == Target::Dist
    }

    pub fn writes_source_maps(self) -> bool {
        self == Target::Dev
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved project directories, all absolute (joined onto the project root).
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
    src: PathBuf,
    dev: PathBuf,
    dist: PathBuf,
    config_file: PathBuf,
    package_file: PathBuf,
}

impl Layout {
    pub fn new(root: &Path, paths: &PathsConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            src: root.join(&paths.src),
            dev: root.join(&paths.dev),
            dist: root.join(&paths.dist),
            config_file: root.join(&paths.config),
            package_file: root.join(&paths.package),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn src(&self) -> &Path {
        &self.src
    }

    /// Output root for a target (`dev/` or `dist/`).
    pub fn output(&self, target: Target) -> &Path {
        match target {
            Target::Dev => &self.dev,
            Target::Dist => &self.dist,
        }
    }

    pub fn media_dir(&self, target: Target) -> PathBuf {
        self.output(target).join("assets/media")
    }

    pub fn scripts_dir(&self, target: Target) -> PathBuf {
        self.output(target).join("assets/scripts")
    }

    pub fn styles_dir(&self, target: Target) -> PathBuf {
        self.output(target).join("assets/styles")
    }

    pub fn screenshot(&self, target: Target) -> PathBuf {
        self.output(target).join("screenshot.png")
    }

    /// The persisted credentials/server record (`config.json`).
    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub fn package_file(&self) -> &Path {
        &self.package_file
    }

    /// Upload ledger for a target, kept next to the project files.
    pub fn upload_ledger(&self, target: Target) -> PathBuf {
        self.root.join(format!(".sitepipe-uploads-{}.json", target.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> Layout {
        Layout::new(Path::new("/project"), &PathsConfig::default())
    }

    #[test]
    fn dist_flag_selects_dist_target() {
        assert_eq!(Target::from_flag(true), Target::Dist);
        assert_eq!(Target::from_flag(false), Target::Dev);
    }

    #[test]
    fn dev_skips_unchanged_and_keeps_maps() {
        assert!(Target::Dev.skips_unchanged());
        assert!(Target::Dev.writes_source_maps());
        assert!(!Target::Dev.cleans_output());
        assert!(!Target::Dev.minifies());
    }

    #[test]
    fn dist_rebuilds_everything() {
        assert!(!Target::Dist.skips_unchanged());
        assert!(Target::Dist.cleans_output());
        assert!(Target::Dist.minifies());
        assert!(!Target::Dist.writes_source_maps());
    }

    #[test]
    fn output_paths_follow_target() {
        let layout = layout();
        assert_eq!(layout.output(Target::Dev), Path::new("/project/dev"));
        assert_eq!(layout.output(Target::Dist), Path::new("/project/dist"));
        assert_eq!(
            layout.media_dir(Target::Dist),
            PathBuf::from("/project/dist/assets/media")
        );
        assert_eq!(
            layout.scripts_dir(Target::Dev),
            PathBuf::from("/project/dev/assets/scripts")
        );
        assert_eq!(
            layout.styles_dir(Target::Dist),
            PathBuf::from("/project/dist/assets/styles")
        );
        assert_eq!(
            layout.screenshot(Target::Dev),
            PathBuf::from("/project/dev/screenshot.png")
        );
    }

    #[test]
    fn upload_ledger_is_per_target() {
        let layout = layout();
        assert_ne!(
            layout.upload_ledger(Target::Dev),
            layout.upload_ledger(Target::Dist)
        );
    }
}
