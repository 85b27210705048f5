//! Source watcher.
//!
//! Watches the source tree recursively and hands debounced batches of changed
//! paths to a callback. A batch closes once no new event has arrived for
//! `watch.debounce_ms`; editors that save through temp files or rename dances
//! therefore trigger a single rebuild.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError, channel};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Cannot watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("File watcher stopped")]
    Disconnected,
}

/// Paths an event touches, or nothing for pure access events.
fn changed_paths(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => event.paths,
        _ => Vec::new(),
    }
}

/// Block until at least one change arrives, then keep collecting until the
/// channel stays quiet for `debounce`.
pub fn next_batch(
    rx: &Receiver<PathBuf>,
    debounce: Duration,
) -> Result<Vec<PathBuf>, WatchError> {
    let mut batch = BTreeSet::new();
    batch.insert(rx.recv().map_err(|_| WatchError::Disconnected)?);
    loop {
        match rx.recv_timeout(debounce) {
            Ok(path) => {
                batch.insert(path);
            }
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(batch.into_iter().collect())
}

/// Watch `roots` forever, calling `on_change` once per debounced batch.
///
/// Only returns when the watcher cannot be set up or dies.
pub fn watch<F>(roots: &[&Path], debounce: Duration, mut on_change: F) -> Result<(), WatchError>
where
    F: FnMut(&[PathBuf]),
{
    let (tx, rx) = channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for path in changed_paths(event) {
                let _ = tx.send(path);
            }
        }
        Err(e) => tracing::warn!(error = %e, "watch error"),
    })
    .map_err(|source| WatchError::Watch {
        path: PathBuf::new(),
        source,
    })?;

    for root in roots {
        watch_path(&mut watcher, root)?;
    }
    tracing::info!(
        paths = ?roots.iter().map(|r| r.display().to_string()).collect::<Vec<_>>(),
        "watching for changes"
    );

    loop {
        let batch = next_batch(&rx, debounce)?;
        tracing::debug!(files = batch.len(), "change batch");
        on_change(&batch);
    }
}

fn watch_path(watcher: &mut RecommendedWatcher, path: &Path) -> Result<(), WatchError> {
    let mode = if path.is_dir() {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher
        .watch(path, mode)
        .map_err(|source| WatchError::Watch {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use std::thread;

    #[test]
    fn access_events_are_ignored() {
        let event = Event::new(EventKind::Access(AccessKind::Any)).add_path("a.scss".into());
        assert!(changed_paths(event).is_empty());
    }

    #[test]
    fn writes_and_creates_are_kept() {
        let modify = Event::new(EventKind::Modify(ModifyKind::Any)).add_path("a.scss".into());
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path("b.js".into());
        assert_eq!(changed_paths(modify), vec![PathBuf::from("a.scss")]);
        assert_eq!(changed_paths(create), vec![PathBuf::from("b.js")]);
    }

    #[test]
    fn burst_collapses_into_one_sorted_batch() {
        let (tx, rx) = channel();
        tx.send(PathBuf::from("src/b.html")).unwrap();
        tx.send(PathBuf::from("src/a.html")).unwrap();
        tx.send(PathBuf::from("src/b.html")).unwrap();

        let batch = next_batch(&rx, Duration::from_millis(20)).unwrap();

        assert_eq!(
            batch,
            vec![PathBuf::from("src/a.html"), PathBuf::from("src/b.html")]
        );
    }

    #[test]
    fn quiet_period_splits_batches() {
        let (tx, rx) = channel();
        let sender = thread::spawn(move || {
            tx.send(PathBuf::from("first")).unwrap();
            thread::sleep(Duration::from_millis(200));
            tx.send(PathBuf::from("second")).unwrap();
        });

        let first = next_batch(&rx, Duration::from_millis(30)).unwrap();
        let second = next_batch(&rx, Duration::from_millis(30)).unwrap();
        sender.join().unwrap();

        assert_eq!(first, vec![PathBuf::from("first")]);
        assert_eq!(second, vec![PathBuf::from("second")]);
    }

    #[test]
    fn closed_channel_is_reported() {
        let (tx, rx) = channel::<PathBuf>();
        drop(tx);
        assert!(matches!(
            next_batch(&rx, Duration::from_millis(5)),
            Err(WatchError::Disconnected)
        ));
    }
}
