//! Ordered glob resolution for task inputs.
//!
//! Tasks describe their inputs as a list of glob patterns relative to the
//! source root, evaluated like a stream source:
//!
//! - patterns are expanded in order, each pattern's matches sorted by path;
//! - a file matched by an earlier pattern is not repeated by a later one, so
//!   `["vendor/jquery.min.js", "vendor/*.js"]` puts jQuery first;
//! - patterns starting with `!` exclude matches from every positive pattern;
//! - each match remembers its path relative to its pattern's *base* (the
//!   leading components without glob characters), which is where it lands
//!   under the output directory;
//! - wildcards never match dotfiles.
//!
//! A pattern without glob characters names a single file; it is silently
//! skipped when that file does not exist.

use globset::{Glob, GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Invalid glob pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("Failed to walk {0}: {1}")]
    Walk(PathBuf, walkdir::Error),
}

/// A resolved input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path relative to the matching pattern's base directory.
    pub relative: PathBuf,
}

impl SourceFile {
    /// Where this file lands when mirrored under `dest_dir`.
    pub fn destination(&self, dest_dir: &Path) -> PathBuf {
        dest_dir.join(&self.relative)
    }
}

fn has_glob_chars(component: &str) -> bool {
    component.contains(['*', '?', '[', '{'])
}

/// Leading literal components of a pattern (`assets/media/**/*` → `assets/media`).
fn glob_base(pattern: &str) -> PathBuf {
    pattern
        .split('/')
        .take_while(|c| !has_glob_chars(c))
        .collect::<Vec<_>>()
        .join("/")
        .into()
}

fn compile(pattern: &str) -> Result<Glob, SourceError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|source| SourceError::Pattern {
            pattern: pattern.to_string(),
            source,
        })
}

fn is_hidden(relative: &Path) -> bool {
    relative
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

/// Compile negated patterns (without their `!`) into one exclusion set.
fn exclusions(patterns: &[&str]) -> Result<GlobSet, SourceError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns.iter().filter_map(|p| p.strip_prefix('!')) {
        builder.add(compile(pattern)?);
    }
    builder.build().map_err(|source| SourceError::Pattern {
        pattern: patterns.join(", "),
        source,
    })
}

/// Expand `patterns` against `root` in order.
pub fn resolve(root: &Path, patterns: &[&str]) -> Result<Vec<SourceFile>, SourceError> {
    let excluded = exclusions(patterns)?;
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for pattern in patterns.iter().filter(|p| !p.starts_with('!')) {
        let base = glob_base(pattern);

        if !has_glob_chars(pattern) {
            let path = root.join(pattern);
            if path.is_file() && !excluded.is_match(pattern) && seen.insert(path.clone()) {
                let relative = PathBuf::from(path.file_name().unwrap_or_default());
                files.push(SourceFile { path, relative });
            }
            continue;
        }

        let matcher: GlobMatcher = compile(pattern)?.compile_matcher();
        let base_dir = root.join(&base);
        if !base_dir.is_dir() {
            continue;
        }

        for entry in WalkDir::new(&base_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| SourceError::Walk(base_dir.clone(), e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(from_root) = entry.path().strip_prefix(root) else {
                continue;
            };
            if is_hidden(from_root) || !matcher.is_match(from_root) || excluded.is_match(from_root)
            {
                continue;
            }
            let path = entry.path().to_path_buf();
            if !seen.insert(path.clone()) {
                continue;
            }
            let relative = from_root
                .strip_prefix(&base)
                .unwrap_or(from_root)
                .to_path_buf();
            files.push(SourceFile { path, relative });
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel).unwrap();
    }

    fn relatives(files: &[SourceFile]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.relative.to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn glob_base_stops_at_first_wildcard() {
        assert_eq!(glob_base("assets/media/**/*"), PathBuf::from("assets/media"));
        assert_eq!(glob_base("**/*"), PathBuf::from(""));
        assert_eq!(glob_base("assets/scripts/*.js"), PathBuf::from("assets/scripts"));
    }

    #[test]
    fn explicit_files_come_first_and_are_not_repeated() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "vendor/a.js");
        touch(tmp.path(), "vendor/bootstrap.min.js");
        touch(tmp.path(), "vendor/jquery.min.js");

        let files = resolve(
            tmp.path(),
            &[
                "vendor/jquery.min.js",
                "vendor/bootstrap.min.js",
                "vendor/*.js",
            ],
        )
        .unwrap();

        assert_eq!(
            relatives(&files),
            vec!["jquery.min.js", "bootstrap.min.js", "a.js"]
        );
    }

    #[test]
    fn missing_literal_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "critical/loadCSS.js");
        let files = resolve(
            tmp.path(),
            &["critical/loadCSS.js", "critical/loadCSS.cssrelpreload.js"],
        )
        .unwrap();
        assert_eq!(relatives(&files), vec!["loadCSS.js"]);
    }

    #[test]
    fn single_star_does_not_cross_directories() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "scripts/main.js");
        touch(tmp.path(), "scripts/vendor/jquery.js");
        let files = resolve(tmp.path(), &["scripts/*.js"]).unwrap();
        assert_eq!(relatives(&files), vec!["main.js"]);
    }

    #[test]
    fn double_star_keeps_subpaths_relative_to_base() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "assets/media/logo.png");
        touch(tmp.path(), "assets/media/icons/star.svg");
        let files = resolve(tmp.path(), &["assets/media/**/*"]).unwrap();
        assert_eq!(relatives(&files), vec!["icons/star.svg", "logo.png"]);
    }

    #[test]
    fn negations_exclude_across_patterns() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "index.html");
        touch(tmp.path(), "screenshot.png");
        touch(tmp.path(), "assets/styles/main.scss");
        touch(tmp.path(), "partials/header.html");

        let files = resolve(
            tmp.path(),
            &["**/*", "!screenshot.png", "!assets", "!assets/**"],
        )
        .unwrap();

        assert_eq!(relatives(&files), vec!["index.html", "partials/header.html"]);
    }

    #[test]
    fn wildcards_skip_dotfiles() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), ".DS_Store");
        touch(tmp.path(), "a/.hidden/x.html");
        touch(tmp.path(), "page.html");
        let files = resolve(tmp.path(), &["**/*"]).unwrap();
        assert_eq!(relatives(&files), vec!["page.html"]);
    }

    #[test]
    fn missing_base_directory_yields_nothing() {
        let tmp = TempDir::new().unwrap();
        assert!(resolve(tmp.path(), &["legacy/**/*"]).unwrap().is_empty());
    }

    #[test]
    fn invalid_pattern_is_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            resolve(tmp.path(), &["a/[b"]),
            Err(SourceError::Pattern { .. })
        ));
    }

    #[test]
    fn destination_mirrors_relative_path() {
        let file = SourceFile {
            path: PathBuf::from("/src/assets/media/icons/star.svg"),
            relative: PathBuf::from("icons/star.svg"),
        };
        assert_eq!(
            file.destination(Path::new("/dev/assets/media")),
            PathBuf::from("/dev/assets/media/icons/star.svg")
        );
    }
}
