//! Modification-time checks that let dev builds skip up-to-date outputs.
//!
//! Two destination shapes exist:
//!
//! - [`Destination::Mirror`]: each source maps to its own output under a
//!   directory. A source passes when its output is missing or older.
//! - [`Destination::Single`]: all sources feed one output (a bundle). If the
//!   output is missing or *any* source is newer, *every* source passes so the
//!   bundle is rebuilt whole; otherwise nothing does.
//!
//! `extras` are dependencies that are not themselves inputs (SCSS partials,
//! HTML partials). When the newest extra is newer than an output, that output
//! is treated as stale.
//!
//! Dist builds never call into this module: they always rebuild everything.

use crate::sources::SourceFile;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub enum Destination<'a> {
    Mirror(&'a Path),
    Single(&'a Path),
}

fn mtime(path: &Path) -> Option<SystemTime> {
    path.metadata().and_then(|m| m.modified()).ok()
}

/// Newest modification time among `paths`, ignoring unreadable ones.
fn newest(paths: &[PathBuf]) -> Option<SystemTime> {
    paths.iter().filter_map(|p| mtime(p)).max()
}

/// True when `dest` is missing or strictly older than `source` or the newest extra.
fn is_stale(source: &Path, dest: &Path, newest_extra: Option<SystemTime>) -> bool {
    let Some(dest_time) = mtime(dest) else {
        return true;
    };
    let source_newer = mtime(source).is_none_or(|t| t > dest_time);
    let extra_newer = newest_extra.is_some_and(|t| t > dest_time);
    source_newer || extra_newer
}

/// Keep only the sources that need processing for `dest`.
pub fn filter_newer(
    files: Vec<SourceFile>,
    dest: Destination<'_>,
    extras: &[PathBuf],
) -> Vec<SourceFile> {
    let newest_extra = newest(extras);
    match dest {
        Destination::Mirror(dir) => files
            .into_iter()
            .filter(|f| is_stale(&f.path, &f.destination(dir), newest_extra))
            .collect(),
        Destination::Single(output) => {
            let rebuild = files
                .iter()
                .any(|f| is_stale(&f.path, output, newest_extra));
            if rebuild { files } else { Vec::new() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_at(path: &Path, age_secs: u64) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
        let when = SystemTime::now() - Duration::from_secs(age_secs);
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(when)
            .unwrap();
    }

    fn source(root: &Path, rel: &str) -> SourceFile {
        SourceFile {
            path: root.join("src").join(rel),
            relative: PathBuf::from(rel),
        }
    }

    #[test]
    fn mirror_passes_missing_outputs() {
        let tmp = TempDir::new().unwrap();
        let file = source(tmp.path(), "a.png");
        write_at(&file.path, 100);

        let out = tmp.path().join("out");
        let kept = filter_newer(vec![file], Destination::Mirror(&out), &[]);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn mirror_skips_up_to_date_outputs() {
        let tmp = TempDir::new().unwrap();
        let fresh = source(tmp.path(), "fresh.png");
        let stale = source(tmp.path(), "stale.png");
        let out = tmp.path().join("out");
        write_at(&fresh.path, 100);
        write_at(&out.join("fresh.png"), 50);
        write_at(&stale.path, 10);
        write_at(&out.join("stale.png"), 50);

        let kept = filter_newer(vec![fresh, stale], Destination::Mirror(&out), &[]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].relative, PathBuf::from("stale.png"));
    }

    #[test]
    fn mirror_extra_newer_than_output_passes_source() {
        let tmp = TempDir::new().unwrap();
        let page = source(tmp.path(), "index.html");
        let partial = tmp.path().join("src/partials/header.html");
        let out = tmp.path().join("out");
        write_at(&page.path, 100);
        write_at(&out.join("index.html"), 50);
        write_at(&partial, 10);

        let kept = filter_newer(vec![page], Destination::Mirror(&out), &[partial]);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn single_rebuilds_all_when_any_source_is_newer() {
        let tmp = TempDir::new().unwrap();
        let a = source(tmp.path(), "a.js");
        let b = source(tmp.path(), "b.js");
        let bundle = tmp.path().join("out/modern.js");
        write_at(&a.path, 100);
        write_at(&bundle, 50);
        write_at(&b.path, 10);

        let kept = filter_newer(vec![a, b], Destination::Single(&bundle), &[]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn single_skips_all_when_bundle_is_current() {
        let tmp = TempDir::new().unwrap();
        let a = source(tmp.path(), "a.js");
        let bundle = tmp.path().join("out/modern.js");
        write_at(&a.path, 100);
        write_at(&bundle, 50);

        assert!(filter_newer(vec![a], Destination::Single(&bundle), &[]).is_empty());
    }

    #[test]
    fn single_missing_bundle_rebuilds() {
        let tmp = TempDir::new().unwrap();
        let a = source(tmp.path(), "a.js");
        write_at(&a.path, 100);
        let bundle = tmp.path().join("out/missing.js");
        assert_eq!(
            filter_newer(vec![a], Destination::Single(&bundle), &[]).len(),
            1
        );
    }

    #[test]
    fn single_extra_partial_triggers_rebuild() {
        let tmp = TempDir::new().unwrap();
        let entry = source(tmp.path(), "modern.scss");
        let partial = tmp.path().join("src/_grid.scss");
        let css = tmp.path().join("out/modern.css");
        write_at(&entry.path, 100);
        write_at(&css, 50);
        write_at(&partial, 10);

        let kept = filter_newer(vec![entry], Destination::Single(&css), &[partial]);
        assert_eq!(kept.len(), 1);
    }
}
