//! Digest row CRUD and the stale sweep (SQLite).

use crate::error::{CatalogError, Result};
use anyhow::Context as _;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{Row as _, SqlitePool};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DigestStatus {
    Todo,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl DigestStatus {
    pub const ALL: [DigestStatus; 5] = [
        DigestStatus::Todo,
        DigestStatus::InProgress,
        DigestStatus::Completed,
        DigestStatus::Failed,
        DigestStatus::Skipped,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DigestStatus::Todo => "todo",
            DigestStatus::InProgress => "in_progress",
            DigestStatus::Completed => "completed",
            DigestStatus::Failed => "failed",
            DigestStatus::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "todo" => Some(DigestStatus::Todo),
            "in_progress" => Some(DigestStatus::InProgress),
            "completed" => Some(DigestStatus::Completed),
            "failed" => Some(DigestStatus::Failed),
            "skipped" => Some(DigestStatus::Skipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for DigestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One digest row: the state of a single digester output for a single file.
#[derive(Debug, Clone, PartialEq)]
pub struct DigestRecord {
    pub id: String,
    pub file_path: String,
    pub digester: String,
    pub status: DigestStatus,
    pub content: Option<String>,
    pub blob_key: Option<String>,
    pub error: Option<String>,
    pub attempts: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl DigestRecord {
    /// Terminal failure: consumed every attempt.
    pub fn is_exhausted(&self, max_attempts: i64) -> bool {
        self.status == DigestStatus::Failed && self.attempts >= max_attempts
    }
}

/// Partial update for a digest row. `None` fields are left untouched;
/// the clear flags null a column out explicitly.
#[derive(Debug, Clone, Default)]
pub struct DigestPatch {
    pub status: Option<DigestStatus>,
    pub content: Option<String>,
    pub blob_key: Option<String>,
    pub error: Option<String>,
    pub attempts: Option<i64>,
    pub clear_content: bool,
    pub clear_blob_key: bool,
    pub clear_error: bool,
}

#[derive(Debug, Clone)]
pub struct DigestStore {
    pool: SqlitePool,
}

const DIGEST_COLUMNS: &str =
    "id, file_path, digester, status, content, blob_key, error, attempts, created_at, updated_at";

impl DigestStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a fresh `todo` row. Fails if the `(file_path, digester)` pair
    /// already exists.
    pub async fn insert(&self, file_path: &str, digester: &str) -> Result<DigestRecord> {
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query("INSERT INTO digests (id, file_path, digester) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(file_path)
            .bind(digester)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to insert digest {digester} for {file_path}"))?;

        self.get_by_id(&id)
            .await?
            .context("digest inserted but not found")
            .map_err(Into::into)
    }

    /// Insert a `todo` row unless the pair already has one. Returns whether a
    /// row was created.
    pub async fn upsert_if_missing(&self, file_path: &str, digester: &str) -> Result<bool> {
        let id = uuid::Uuid::new_v4().to_string();

        let result = sqlx::query(
            "INSERT INTO digests (id, file_path, digester) VALUES (?, ?, ?) \
             ON CONFLICT(file_path, digester) DO NOTHING",
        )
        .bind(&id)
        .bind(file_path)
        .bind(digester)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to ensure digest {digester} for {file_path}"))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<DigestRecord>> {
        let row = sqlx::query(&format!("SELECT {DIGEST_COLUMNS} FROM digests WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to fetch digest {id}"))?;

        row.map(|row| digest_from_row(&row)).transpose()
    }

    pub async fn get_by_file_and_name(
        &self,
        file_path: &str,
        digester: &str,
    ) -> Result<Option<DigestRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {DIGEST_COLUMNS} FROM digests WHERE file_path = ? AND digester = ?"
        ))
        .bind(file_path)
        .bind(digester)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to fetch digest {digester} for {file_path}"))?;

        row.map(|row| digest_from_row(&row)).transpose()
    }

    pub async fn list_for_file(&self, file_path: &str) -> Result<Vec<DigestRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {DIGEST_COLUMNS} FROM digests WHERE file_path = ? ORDER BY created_at ASC, digester ASC"
        ))
        .bind(file_path)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to list digests for {file_path}"))?;

        rows.iter().map(digest_from_row).collect()
    }

    /// Apply a partial update. `updated_at` always advances.
    pub async fn update(&self, id: &str, patch: DigestPatch) -> Result<DigestRecord> {
        let mut query = String::from("UPDATE digests SET updated_at = datetime('now')");

        if patch.status.is_some() {
            query.push_str(", status = ?");
        }
        if patch.clear_content {
            query.push_str(", content = NULL");
        } else if patch.content.is_some() {
            query.push_str(", content = ?");
        }
        if patch.clear_blob_key {
            query.push_str(", blob_key = NULL");
        } else if patch.blob_key.is_some() {
            query.push_str(", blob_key = ?");
        }
        if patch.clear_error {
            query.push_str(", error = NULL");
        } else if patch.error.is_some() {
            query.push_str(", error = ?");
        }
        if patch.attempts.is_some() {
            query.push_str(", attempts = ?");
        }
        query.push_str(" WHERE id = ?");

        let mut sql = sqlx::query(&query);
        if let Some(status) = patch.status {
            sql = sql.bind(status.as_str());
        }
        if !patch.clear_content && let Some(content) = &patch.content {
            sql = sql.bind(content);
        }
        if !patch.clear_blob_key && let Some(blob_key) = &patch.blob_key {
            sql = sql.bind(blob_key);
        }
        if !patch.clear_error && let Some(error) = &patch.error {
            sql = sql.bind(error);
        }
        if let Some(attempts) = patch.attempts {
            sql = sql.bind(attempts);
        }

        sql.bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to update digest {id}"))?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| CatalogError::DigestNotFound { id: id.to_string() }.into())
    }

    /// Transition a row to in_progress, consuming one attempt (capped).
    pub async fn mark_in_progress(&self, id: &str, max_attempts: i64) -> Result<()> {
        sqlx::query(
            "UPDATE digests SET status = 'in_progress', \
             attempts = MIN(attempts + 1, ?), updated_at = datetime('now') WHERE id = ?",
        )
        .bind(max_attempts)
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to mark digest {id} in progress"))?;

        Ok(())
    }

    /// Rewind a row to a pristine `todo`.
    pub async fn reset_row(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE digests SET status = 'todo', content = NULL, blob_key = NULL, \
             error = NULL, attempts = 0, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to reset digest {id}"))?;

        Ok(())
    }

    pub async fn delete_by_file(&self, file_path: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM digests WHERE file_path = ?")
            .bind(file_path)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete digests for {file_path}"))?;

        Ok(result.rows_affected())
    }

    /// Delete every row whose file path starts with `prefix` (folder removal).
    pub async fn delete_by_path_prefix(&self, prefix: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM digests WHERE file_path = ? OR file_path LIKE ? || '/%'")
            .bind(prefix.trim_end_matches('/'))
            .bind(prefix.trim_end_matches('/'))
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete digests under {prefix}"))?;

        Ok(result.rows_affected())
    }

    /// Move rows from one file path to another (rename), folder children
    /// included.
    pub async fn update_paths(&self, old_path: &str, new_path: &str) -> Result<u64> {
        let exact = sqlx::query("UPDATE digests SET file_path = ? WHERE file_path = ?")
            .bind(new_path)
            .bind(old_path)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to move digests from {old_path}"))?;

        let children = sqlx::query(
            "UPDATE digests SET file_path = ? || substr(file_path, ?) WHERE file_path LIKE ? || '/%'",
        )
        .bind(new_path)
        .bind(old_path.len() as i64 + 1)
        .bind(old_path)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to move child digests from {old_path}"))?;

        Ok(exact.rows_affected() + children.rows_affected())
    }

    /// Re-key a file's blob pointers after a rename moved its artifact
    /// namespace. Prefixes are `/`-terminated (`<path-hash>/`).
    pub async fn rewrite_blob_keys(
        &self,
        file_path: &str,
        old_prefix: &str,
        new_prefix: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE digests SET blob_key = ? || substr(blob_key, ?) \
             WHERE file_path = ? AND blob_key LIKE ? || '%'",
        )
        .bind(new_prefix)
        .bind(old_prefix.len() as i64 + 1)
        .bind(file_path)
        .bind(old_prefix)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to re-key blob pointers for {file_path}"))?;

        Ok(result.rows_affected())
    }

    /// Reclaim rows stuck in_progress longer than `threshold` back to `todo`.
    ///
    /// The only transition out of in_progress that does not require the
    /// file's lock; it recovers from crashed workers.
    pub async fn reset_stale(&self, threshold: Duration) -> Result<u64> {
        let modifier = format!("-{} seconds", threshold.as_secs());

        let result = sqlx::query(
            "UPDATE digests SET status = 'todo', error = NULL, updated_at = datetime('now') \
             WHERE status = 'in_progress' AND updated_at < datetime('now', ?)",
        )
        .bind(&modifier)
        .execute(&self.pool)
        .await
        .context("failed to reset stale digests")?;

        Ok(result.rows_affected())
    }

    /// Per-digester status counts, for the status CLI.
    pub async fn status_counts(&self) -> Result<Vec<(String, DigestStatus, i64)>> {
        let rows = sqlx::query(
            "SELECT digester, status, COUNT(*) AS n FROM digests \
             GROUP BY digester, status ORDER BY digester ASC, status ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to count digests")?;

        rows.iter()
            .map(|row| {
                let digester: String = row.try_get("digester").context("failed to read digester")?;
                let status_value: String = row.try_get("status").context("failed to read status")?;
                let count: i64 = row.try_get("n").context("failed to read count")?;
                let status = DigestStatus::parse(&status_value)
                    .ok_or(CatalogError::InvalidStatus(status_value))?;
                Ok((digester, status, count))
            })
            .collect()
    }
}

fn digest_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<DigestRecord> {
    let status_value: String = row
        .try_get("status")
        .context("failed to read digest status")?;
    let status = DigestStatus::parse(&status_value)
        .ok_or(CatalogError::InvalidStatus(status_value))?;

    Ok(DigestRecord {
        id: row.try_get("id").context("failed to read digest id")?,
        file_path: row
            .try_get("file_path")
            .context("failed to read digest file_path")?,
        digester: row
            .try_get("digester")
            .context("failed to read digest name")?,
        status,
        content: row.try_get::<Option<String>, _>("content").ok().flatten(),
        blob_key: row.try_get::<Option<String>, _>("blob_key").ok().flatten(),
        error: row.try_get::<Option<String>, _>("error").ok().flatten(),
        attempts: row.try_get("attempts").context("failed to read attempts")?,
        created_at: row
            .try_get("created_at")
            .context("failed to read created_at")?,
        updated_at: row
            .try_get("updated_at")
            .context("failed to read updated_at")?,
    })
}
