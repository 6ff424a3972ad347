//! Filesystem blob store.
//!
//! Keys have the shape `<path-hash>/<digester>/<filename>` where `path-hash`
//! is a stable short encoding of the catalog file path. Keys under
//! `<path-hash>/<digester>/` form that digester's artifact namespace for the
//! file, so reset and deletion are prefix operations.

use crate::error::{BlobError, Result};
use anyhow::Context as _;
use sha2::{Digest as _, Sha256};
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// Stable short encoding of a catalog file path: first 16 hex chars of its
/// SHA-256.
pub fn path_hash(file_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_path.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// Build a full blob key for one artifact of one digester run.
pub fn blob_key(file_path: &str, digester: &str, filename: &str) -> String {
    format!("{}/{}/{}", path_hash(file_path), digester, filename)
}

/// The whole artifact namespace of a file.
pub fn file_prefix(file_path: &str) -> String {
    format!("{}/", path_hash(file_path))
}

/// One digester's artifact namespace for a file.
pub fn digester_prefix(file_path: &str, digester: &str) -> String {
    format!("{}/{}/", path_hash(file_path), digester)
}

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write bytes under `key`, atomically (temp file + rename).
    pub async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let target = self.resolve(key)?;
        let parent = target
            .parent()
            .ok_or_else(|| BlobError::InvalidKey {
                key: key.to_string(),
            })?
            .to_path_buf();

        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|source| BlobError::Io {
                key: key.to_string(),
                source,
            })?;

        let key_owned = key.to_string();
        tokio::task::spawn_blocking(move || -> std::result::Result<(), BlobError> {
            let mut temp = tempfile::NamedTempFile::new_in(&parent).map_err(|source| {
                BlobError::Io {
                    key: key_owned.clone(),
                    source,
                }
            })?;
            temp.write_all(&bytes).map_err(|source| BlobError::Io {
                key: key_owned.clone(),
                source,
            })?;
            temp.persist(&target).map_err(|error| BlobError::Io {
                key: key_owned.clone(),
                source: error.error,
            })?;
            Ok(())
        })
        .await
        .context("blob write task panicked")??;

        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let target = self.resolve(key)?;

        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound {
                    key: key.to_string(),
                }
                .into())
            }
            Err(source) => Err(BlobError::Io {
                key: key.to_string(),
                source,
            }
            .into()),
        }
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let target = self.resolve(key)?;
        Ok(tokio::fs::try_exists(&target).await.unwrap_or(false))
    }

    /// All keys under a `/`-terminated namespace prefix, sorted.
    pub async fn enumerate_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let trimmed = prefix.trim_end_matches('/');
        let dir = self.resolve(trimmed)?;

        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut stack = vec![dir];

        while let Some(current) = stack.pop() {
            let mut entries =
                tokio::fs::read_dir(&current)
                    .await
                    .map_err(|source| BlobError::Io {
                        key: prefix.to_string(),
                        source,
                    })?;

            while let Some(entry) = entries.next_entry().await.map_err(|source| BlobError::Io {
                key: prefix.to_string(),
                source,
            })? {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    let key = relative
                        .components()
                        .map(|component| component.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Move every blob from one namespace prefix to another. The path hash
    /// is derived from the file path, so renaming a file relocates its whole
    /// artifact namespace. Returns the number of blobs moved.
    pub async fn rename_prefix(&self, old_prefix: &str, new_prefix: &str) -> Result<u64> {
        let keys = self.enumerate_prefix(old_prefix).await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let old_trimmed = old_prefix.trim_end_matches('/');
        let new_trimmed = new_prefix.trim_end_matches('/');

        let mut moved = 0u64;
        for key in &keys {
            let Some(suffix) = key.strip_prefix(old_trimmed) else {
                continue;
            };
            let bytes = self.get(key).await?;
            self.put(&format!("{new_trimmed}{suffix}"), bytes).await?;
            moved += 1;
        }

        self.delete_prefix(old_prefix).await?;
        Ok(moved)
    }

    /// Delete every blob under a namespace prefix. Returns the number of
    /// blobs removed.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let removed = self.enumerate_prefix(prefix).await?.len() as u64;
        if removed == 0 {
            return Ok(0);
        }

        let dir = self.resolve(prefix.trim_end_matches('/'))?;
        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|source| BlobError::Io {
                key: prefix.to_string(),
                source,
            })?;

        Ok(removed)
    }

    /// Map a key onto the store root, refusing traversal and empty segments.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.starts_with('/') || key.contains('\\') {
            return Err(BlobError::InvalidKey {
                key: key.to_string(),
            }
            .into());
        }

        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(BlobError::InvalidKey {
                    key: key.to_string(),
                }
                .into());
            }
            path.push(segment);
        }

        Ok(path)
    }
}
