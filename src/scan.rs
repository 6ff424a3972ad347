//! Data-root scanner: keeps the catalog in sync with the filesystem.
//!
//! Walks the data root (or re-stats a single path on watcher events),
//! creating and refreshing file records, materializing digest placeholders,
//! and cleaning up catalog and blob state for vanished paths.

use crate::PipelineDeps;
use crate::blob;
use crate::catalog::{FileRecord, UpsertFileInput};
use crate::digest::{Registry, ensure};
use crate::error::Result;
use anyhow::Context as _;
use sha2::{Digest as _, Sha256};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt as _;

/// SHA-256 hex digest of raw content, the catalog's content hash.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// What one full scan did.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanSummary {
    pub files: u64,
    pub folders: u64,
    pub pruned: u64,
}

#[derive(Clone)]
pub struct Scanner {
    deps: PipelineDeps,
    registry: Arc<Registry>,
}

impl Scanner {
    pub fn new(deps: PipelineDeps, registry: Arc<Registry>) -> Self {
        Self { deps, registry }
    }

    /// Walk the whole data root: upsert records, ensure placeholders, prune
    /// records whose filesystem entry vanished.
    pub async fn scan_all(&self) -> Result<ScanSummary> {
        let root = self.deps.config.data_root.clone();
        let mut summary = ScanSummary::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut stack = vec![root.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .with_context(|| format!("failed to read directory {}", dir.display()))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .with_context(|| format!("failed to enumerate {}", dir.display()))?
            {
                let path = entry.path();
                let Some(relative) = relative_of(&root, &path) else {
                    continue;
                };
                if self.excluded(&relative) {
                    continue;
                }

                let file_type = entry
                    .file_type()
                    .await
                    .with_context(|| format!("failed to stat {}", path.display()))?;

                if file_type.is_dir() {
                    self.record_folder(&relative).await?;
                    seen.insert(relative);
                    summary.folders += 1;
                    stack.push(path);
                } else if file_type.is_file() {
                    self.record_file(&relative, &path).await?;
                    ensure::ensure_placeholders(&self.deps.catalog, &self.registry, &relative)
                        .await?;
                    seen.insert(relative);
                    summary.files += 1;
                }
                // Symlinks and special files are ignored.
            }
        }

        for path in self.deps.catalog.files.list_all_paths().await? {
            if !seen.contains(&path) && !self.excluded(&path) {
                summary.pruned += self.remove_path(&path).await?;
            }
        }

        tracing::info!(
            files = summary.files,
            folders = summary.folders,
            pruned = summary.pruned,
            "data root scanned"
        );
        Ok(summary)
    }

    /// Re-observe a single path. Returns the refreshed record, or `None`
    /// after cleaning up a vanished path.
    pub async fn scan_path(&self, relative: &str) -> Result<Option<FileRecord>> {
        if self.excluded(relative) {
            return Ok(None);
        }

        let absolute = self.deps.config.data_root.join(relative);
        let metadata = match tokio::fs::metadata(&absolute).await {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                self.remove_path(relative).await?;
                return Ok(None);
            }
            Err(error) => {
                return Err(anyhow::anyhow!(
                    "failed to stat {}: {error}",
                    absolute.display()
                )
                .into());
            }
        };

        if metadata.is_dir() {
            let record = self.record_folder(relative).await?;
            return Ok(Some(record));
        }

        let record = self.record_file(relative, &absolute).await?;
        ensure::ensure_placeholders(&self.deps.catalog, &self.registry, relative).await?;
        Ok(Some(record))
    }

    /// Carry a renamed path's records, digest history, and blob artifacts
    /// over to its new location, then re-observe it. Folder renames carry
    /// every child along.
    ///
    /// Blob keys embed a hash of the file path, so each affected file's
    /// artifact namespace is relocated and the blob pointers on its digest
    /// rows and file record are re-keyed to match.
    pub async fn rename_path(&self, old_path: &str, new_path: &str) -> Result<Option<FileRecord>> {
        let affected = self.deps.catalog.files.list_paths_under(old_path).await?;
        if affected.is_empty() {
            // Nothing known under the old path; observe the new one fresh.
            return self.scan_path(new_path).await;
        }

        self.deps.catalog.files.rename(old_path, new_path).await?;
        self.deps
            .catalog
            .digests
            .update_paths(old_path, new_path)
            .await?;

        for old_child in &affected {
            let new_child = renamed_child(old_path, new_path, old_child);
            let old_prefix = blob::file_prefix(old_child);
            let new_prefix = blob::file_prefix(&new_child);

            self.deps
                .blobs
                .rename_prefix(&old_prefix, &new_prefix)
                .await?;
            self.deps
                .catalog
                .digests
                .rewrite_blob_keys(&new_child, &old_prefix, &new_prefix)
                .await?;
            self.deps
                .catalog
                .files
                .rewrite_screenshot_key(&new_child, &old_prefix, &new_prefix)
                .await?;
        }

        tracing::info!(
            from = old_path,
            to = new_path,
            moved = affected.len(),
            "catalog entries renamed"
        );

        self.scan_path(new_path).await
    }

    /// Drop every trace of a path: digest rows, blob namespaces, records.
    /// Returns the number of file records removed.
    pub async fn remove_path(&self, relative: &str) -> Result<u64> {
        let affected = self.deps.catalog.files.list_paths_under(relative).await?;
        if affected.is_empty() {
            return Ok(0);
        }

        for path in &affected {
            self.deps
                .blobs
                .delete_prefix(&blob::file_prefix(path))
                .await?;
        }

        self.deps
            .catalog
            .digests
            .delete_by_path_prefix(relative)
            .await?;
        let removed = self
            .deps
            .catalog
            .files
            .delete_by_path_prefix(relative)
            .await?;

        tracing::info!(path = relative, removed, "catalog entries removed for vanished path");
        Ok(removed)
    }

    fn excluded(&self, relative: &str) -> bool {
        let as_dir = format!("{relative}/");
        self.deps
            .config
            .digest
            .excluded_path_prefixes
            .iter()
            .any(|prefix| relative.starts_with(prefix.as_str()) || as_dir == *prefix)
    }

    async fn record_folder(&self, relative: &str) -> Result<FileRecord> {
        let name = leaf_name(relative);
        self.deps
            .catalog
            .files
            .upsert(UpsertFileInput {
                path: relative.to_string(),
                name,
                is_folder: true,
                size: 0,
                mime_type: None,
                content_hash: None,
                modified_at: None,
            })
            .await
    }

    async fn record_file(&self, relative: &str, absolute: &Path) -> Result<FileRecord> {
        let metadata = tokio::fs::metadata(absolute)
            .await
            .with_context(|| format!("failed to stat {}", absolute.display()))?;

        let modified_at = metadata
            .modified()
            .ok()
            .map(|time| chrono::DateTime::<chrono::Utc>::from(time).naive_utc());

        let mime_type = mime_guess::from_path(relative)
            .first()
            .map(|mime| mime.essence_str().to_string());

        let content_hash = hash_file(absolute).await.ok();

        self.deps
            .catalog
            .files
            .upsert(UpsertFileInput {
                path: relative.to_string(),
                name: leaf_name(relative),
                is_folder: false,
                size: metadata.len() as i64,
                mime_type,
                content_hash,
                modified_at,
            })
            .await
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner").finish_non_exhaustive()
    }
}

/// Streaming SHA-256 of a file on disk.
async fn hash_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let read = file
            .read(&mut buffer)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// A child of the renamed path, expressed under the new path.
fn renamed_child(old_path: &str, new_path: &str, old_child: &str) -> String {
    match old_child.strip_prefix(old_path) {
        Some(suffix) => format!("{new_path}{suffix}"),
        None => old_child.to_string(),
    }
}

fn relative_of(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let joined = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    (!joined.is_empty()).then_some(joined)
}

fn leaf_name(relative: &str) -> String {
    relative
        .rsplit('/')
        .next()
        .unwrap_or(relative)
        .to_string()
}
