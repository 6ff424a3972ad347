//! File record CRUD (SQLite).

use crate::error::Result;
use anyhow::Context as _;
use chrono::NaiveDateTime;
use sqlx::{Row as _, SqlitePool};

/// A file (or folder) tracked by the catalog.
///
/// `preview` and `screenshot_key` are denormalizations of digest outputs
/// maintained by the coordinator; everything else comes from the scanner.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: String,
    pub name: String,
    pub is_folder: bool,
    pub size: i64,
    pub mime_type: Option<String>,
    pub content_hash: Option<String>,
    pub modified_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub last_scanned_at: Option<NaiveDateTime>,
    pub preview: Option<String>,
    pub screenshot_key: Option<String>,
}

/// Input for creating or refreshing a file record.
#[derive(Debug, Clone)]
pub struct UpsertFileInput {
    pub path: String,
    pub name: String,
    pub is_folder: bool,
    pub size: i64,
    pub mime_type: Option<String>,
    pub content_hash: Option<String>,
    pub modified_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    pool: SqlitePool,
}

const FILE_COLUMNS: &str = "path, name, is_folder, size, mime_type, content_hash, \
     modified_at, created_at, last_scanned_at, preview, screenshot_key";

impl FileStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create or refresh a record. Refreshing touches `last_scanned_at` and
    /// leaves the coordinator-owned denormalizations alone.
    pub async fn upsert(&self, input: UpsertFileInput) -> Result<FileRecord> {
        sqlx::query(
            r#"
            INSERT INTO files (path, name, is_folder, size, mime_type, content_hash, modified_at, last_scanned_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))
            ON CONFLICT(path) DO UPDATE SET
                name = excluded.name,
                is_folder = excluded.is_folder,
                size = excluded.size,
                mime_type = excluded.mime_type,
                content_hash = excluded.content_hash,
                modified_at = excluded.modified_at,
                last_scanned_at = datetime('now')
            "#,
        )
        .bind(&input.path)
        .bind(&input.name)
        .bind(input.is_folder)
        .bind(input.size)
        .bind(&input.mime_type)
        .bind(&input.content_hash)
        .bind(input.modified_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to upsert file {}", input.path))?;

        self.get_by_path(&input.path)
            .await?
            .context("file upserted but not found")
            .map_err(Into::into)
    }

    pub async fn get_by_path(&self, path: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query(&format!("SELECT {FILE_COLUMNS} FROM files WHERE path = ?"))
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to fetch file {path}"))?;

        row.map(|row| file_from_row(&row)).transpose()
    }

    /// Every non-folder record, oldest created first.
    pub async fn list_non_folders(&self) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE is_folder = 0 ORDER BY created_at ASC, path ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .context("failed to list files")?;

        rows.iter().map(file_from_row).collect()
    }

    /// Every known path, folders included. Used by the scanner to prune
    /// records whose filesystem entry vanished.
    pub async fn list_all_paths(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT path FROM files ORDER BY path ASC")
            .fetch_all(&self.pool)
            .await
            .context("failed to list file paths")?;

        rows.iter()
            .map(|row| row.try_get("path").context("failed to read path"))
            .collect::<anyhow::Result<Vec<String>>>()
            .map_err(Into::into)
    }

    /// Paths at or under `prefix` (a file path or a folder).
    pub async fn list_paths_under(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.trim_end_matches('/');
        let rows = sqlx::query(
            "SELECT path FROM files WHERE path = ? OR path LIKE ? || '/%' ORDER BY path ASC",
        )
        .bind(prefix)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to list paths under {prefix}"))?;

        rows.iter()
            .map(|row| row.try_get("path").context("failed to read path"))
            .collect::<anyhow::Result<Vec<String>>>()
            .map_err(Into::into)
    }

    /// Delete a record and, when it is a folder, everything under it.
    pub async fn delete_by_path_prefix(&self, prefix: &str) -> Result<u64> {
        let prefix = prefix.trim_end_matches('/');
        let result = sqlx::query("DELETE FROM files WHERE path = ? OR path LIKE ? || '/%'")
            .bind(prefix)
            .bind(prefix)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete files under {prefix}"))?;

        Ok(result.rows_affected())
    }

    pub async fn set_screenshot_key(&self, path: &str, key: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE files SET screenshot_key = ? WHERE path = ?")
            .bind(key)
            .bind(path)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to set screenshot key for {path}"))?;

        Ok(())
    }

    /// Re-key the denormalized screenshot pointer after a rename moved the
    /// file's blob namespace.
    pub async fn rewrite_screenshot_key(
        &self,
        path: &str,
        old_prefix: &str,
        new_prefix: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE files SET screenshot_key = ? || substr(screenshot_key, ?) \
             WHERE path = ? AND screenshot_key LIKE ? || '%'",
        )
        .bind(new_prefix)
        .bind(old_prefix.len() as i64 + 1)
        .bind(path)
        .bind(old_prefix)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to re-key screenshot pointer for {path}"))?;

        Ok(())
    }

    pub async fn set_preview(&self, path: &str, preview: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE files SET preview = ? WHERE path = ?")
            .bind(preview)
            .bind(path)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to set preview for {path}"))?;

        Ok(())
    }

    /// Rename a record, carrying children along when the old path is a folder.
    pub async fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        sqlx::query("UPDATE files SET path = ? WHERE path = ?")
            .bind(new_path)
            .bind(old_path)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to rename {old_path} to {new_path}"))?;

        sqlx::query(
            "UPDATE files SET path = ? || substr(path, ?) WHERE path LIKE ? || '/%'",
        )
        .bind(new_path)
        .bind(old_path.len() as i64 + 1)
        .bind(old_path)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to rename children of {old_path}"))?;

        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete file {path}"))?;

        Ok(result.rows_affected() > 0)
    }
}

fn file_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<FileRecord> {
    Ok(FileRecord {
        path: row.try_get("path").context("failed to read file path")?,
        name: row.try_get("name").context("failed to read file name")?,
        is_folder: row.try_get("is_folder").context("failed to read is_folder")?,
        size: row.try_get("size").context("failed to read size")?,
        mime_type: row.try_get::<Option<String>, _>("mime_type").ok().flatten(),
        content_hash: row
            .try_get::<Option<String>, _>("content_hash")
            .ok()
            .flatten(),
        modified_at: row
            .try_get::<Option<NaiveDateTime>, _>("modified_at")
            .ok()
            .flatten(),
        created_at: row
            .try_get("created_at")
            .context("failed to read created_at")?,
        last_scanned_at: row
            .try_get::<Option<NaiveDateTime>, _>("last_scanned_at")
            .ok()
            .flatten(),
        preview: row.try_get::<Option<String>, _>("preview").ok().flatten(),
        screenshot_key: row
            .try_get::<Option<String>, _>("screenshot_key")
            .ok()
            .flatten(),
    })
}
