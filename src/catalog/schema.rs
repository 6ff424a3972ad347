//! Catalog schema creation.

use crate::error::Result;
use anyhow::Context as _;
use sqlx::SqlitePool;

/// Create the catalog tables if they don't exist.
pub async fn initialize(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            path TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            is_folder INTEGER NOT NULL DEFAULT 0,
            size INTEGER NOT NULL DEFAULT 0,
            mime_type TEXT,
            content_hash TEXT,
            modified_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            last_scanned_at TIMESTAMP,
            preview TEXT,
            screenshot_key TEXT
        )
        "#,
    )
    .execute(pool)
    .await
    .with_context(|| "failed to create files table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS digests (
            id TEXT PRIMARY KEY,
            file_path TEXT NOT NULL,
            digester TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'todo',
            content TEXT,
            blob_key TEXT,
            error TEXT,
            attempts INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(file_path, digester)
        )
        "#,
    )
    .execute(pool)
    .await
    .with_context(|| "failed to create digests table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS file_locks (
            path TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            acquired_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .with_context(|| "failed to create file_locks table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_digests_file ON digests(file_path)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_digests_status ON digests(status)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_scanned ON files(last_scanned_at)")
        .execute(pool)
        .await?;

    Ok(())
}
