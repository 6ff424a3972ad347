//! Catalog-backed advisory per-file lock.
//!
//! The lock is the sole gate on concurrent processing of one file. It lives
//! in SQLite so it holds across processes and survives a worker crash; a
//! holder that never released is evicted once its acquisition timestamp ages
//! past the stale threshold.

use crate::error::Result;
use anyhow::Context as _;
use chrono::NaiveDateTime;
use sqlx::{Row as _, SqlitePool};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LockStore {
    pool: SqlitePool,
}

impl LockStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Non-blocking acquisition. Returns whether `owner` now holds the lock.
    ///
    /// A lock older than `stale_after` is stolen in the same statement, so a
    /// crashed holder cannot park a file forever.
    pub async fn try_acquire(&self, path: &str, owner: &str, stale_after: Duration) -> Result<bool> {
        let modifier = format!("-{} seconds", stale_after.as_secs());

        let result = sqlx::query(
            "INSERT INTO file_locks (path, owner, acquired_at) VALUES (?, ?, datetime('now')) \
             ON CONFLICT(path) DO UPDATE SET owner = excluded.owner, acquired_at = excluded.acquired_at \
             WHERE file_locks.acquired_at < datetime('now', ?)",
        )
        .bind(path)
        .bind(owner)
        .bind(&modifier)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to acquire lock on {path}"))?;

        Ok(result.rows_affected() > 0)
    }

    /// Release the lock if `owner` still holds it.
    pub async fn release(&self, path: &str, owner: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM file_locks WHERE path = ? AND owner = ?")
            .bind(path)
            .bind(owner)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to release lock on {path}"))?;

        Ok(result.rows_affected() > 0)
    }

    /// Current holder, if any.
    pub async fn holder(&self, path: &str) -> Result<Option<(String, NaiveDateTime)>> {
        let row = sqlx::query("SELECT owner, acquired_at FROM file_locks WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read lock on {path}"))?;

        row.map(|row| {
            let owner: String = row.try_get("owner").context("failed to read lock owner")?;
            let acquired_at: NaiveDateTime = row
                .try_get("acquired_at")
                .context("failed to read lock timestamp")?;
            Ok((owner, acquired_at))
        })
        .transpose()
    }
}
