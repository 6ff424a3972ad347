//! Filesystem change events for the digest pipeline.
//!
//! A notify watcher on the data root is translated into catalog-relative
//! [`FileChangeEvent`]s on a broadcast channel. The supervisor subscribes and
//! reacts; slow subscribers may lag and simply miss events, which is fine
//! because the periodic scan re-observes everything.

use crate::error::Result;
use anyhow::Context as _;
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{RecursiveMode, Watcher as _};
use std::path::Path;
use tokio::sync::broadcast;

/// One observed change to a path under the data root.
#[derive(Debug, Clone)]
pub struct FileChangeEvent {
    /// Catalog-relative path.
    pub path: String,
    /// The path did not exist before.
    pub is_new: bool,
    /// The bytes behind the path changed.
    pub content_changed: bool,
    /// Existing digests no longer describe the file and must be re-derived.
    pub should_invalidate_digests: bool,
    /// The path is gone; catalog and blob state should be cleaned up.
    pub removed: bool,
    /// The path used to live here. Set for renames observed with both ends,
    /// so catalog records, digest history, and blob artifacts can be carried
    /// over instead of re-derived from scratch.
    pub renamed_from: Option<String>,
}

/// Handle keeping the notify watcher alive and fanning events out.
pub struct FileWatcher {
    tx: broadcast::Sender<FileChangeEvent>,
    _watcher: notify::RecommendedWatcher,
}

impl FileWatcher {
    /// Watch `data_root` recursively, filtering excluded path prefixes.
    pub fn start(data_root: &Path, excluded_prefixes: &[String]) -> Result<Self> {
        let (tx, _) = broadcast::channel(256);
        let sender = tx.clone();
        let root = data_root.to_path_buf();
        let excluded = excluded_prefixes.to_vec();

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            let event = match result {
                Ok(event) => event,
                Err(error) => {
                    tracing::warn!(%error, "filesystem watcher error");
                    return;
                }
            };

            let relative = relative_paths(&root, &excluded, &event.paths);
            for change in events_for(&event.kind, relative) {
                // Send only fails when nobody is subscribed yet.
                let _ = sender.send(change);
            }
        })
        .context("failed to create filesystem watcher")?;

        watcher
            .watch(data_root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch {}", data_root.display()))?;

        tracing::info!(path = %data_root.display(), "filesystem watcher started");

        Ok(Self {
            tx,
            _watcher: watcher,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FileChangeEvent> {
        self.tx.subscribe()
    }
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher").finish_non_exhaustive()
    }
}

/// Normalize raw watcher paths to catalog-relative strings, dropping paths
/// outside the root and under excluded prefixes.
fn relative_paths(
    root: &Path,
    excluded_prefixes: &[String],
    paths: &[std::path::PathBuf],
) -> Vec<String> {
    paths
        .iter()
        .filter_map(|path| {
            let relative = path.strip_prefix(root).ok()?;
            let relative = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if relative.is_empty() {
                return None;
            }
            let as_dir = format!("{relative}/");
            if excluded_prefixes
                .iter()
                .any(|prefix| relative.starts_with(prefix.as_str()) || as_dir == *prefix)
            {
                return None;
            }
            Some(relative)
        })
        .collect()
}

/// Translate one notify event kind into pipeline change events.
fn events_for(kind: &EventKind, relative: Vec<String>) -> Vec<FileChangeEvent> {
    match kind {
        EventKind::Create(_) => creation_events(relative),
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => relative
            .into_iter()
            .map(|path| FileChangeEvent {
                path,
                is_new: false,
                content_changed: true,
                should_invalidate_digests: true,
                removed: false,
                renamed_from: None,
            })
            .collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            // Only the vacated end is visible; the `To` half (or a scan)
            // observes the new location.
            RenameMode::From => removal_events(relative),
            RenameMode::To => creation_events(relative),
            // `Both` carries [old, new]: a true rename whose history can be
            // carried over.
            RenameMode::Both if relative.len() == 2 => vec![FileChangeEvent {
                path: relative[1].clone(),
                is_new: false,
                content_changed: false,
                should_invalidate_digests: false,
                removed: false,
                renamed_from: Some(relative[0].clone()),
            }],
            // One end fell outside the root or into an excluded prefix;
            // a re-stat of whatever survived sorts it out.
            _ => relative
                .into_iter()
                .map(|path| FileChangeEvent {
                    path,
                    is_new: false,
                    content_changed: true,
                    should_invalidate_digests: true,
                    removed: false,
                    renamed_from: None,
                })
                .collect(),
        },
        EventKind::Remove(_) => removal_events(relative),
        _ => Vec::new(),
    }
}

fn creation_events(relative: Vec<String>) -> Vec<FileChangeEvent> {
    relative
        .into_iter()
        .map(|path| FileChangeEvent {
            path,
            is_new: true,
            content_changed: true,
            should_invalidate_digests: false,
            removed: false,
            renamed_from: None,
        })
        .collect()
}

fn removal_events(relative: Vec<String>) -> Vec<FileChangeEvent> {
    relative
        .into_iter()
        .map(|path| FileChangeEvent {
            path,
            is_new: false,
            content_changed: false,
            should_invalidate_digests: false,
            removed: true,
            renamed_from: None,
        })
        .collect()
}
