//! Task queue hand-off for downstream indexing.
//!
//! The digest pipeline only enqueues; the indexer handlers drain the queue
//! from their own process and are idempotent against the search engines.

use crate::error::{QueueError, Result};
use anyhow::Context as _;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Task type drained by the keyword-index handler.
pub const TASK_INDEX_KEYWORD: &str = "index-keyword";

/// Task type drained by the vector-index handler.
pub const TASK_INDEX_SEMANTIC: &str = "index-semantic";

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a task, returning its opaque id.
    async fn enqueue(&self, task_type: &str, payload: Value) -> Result<String>;
}

/// SQLite-backed queue sharing the catalog database.
#[derive(Debug, Clone)]
pub struct SqliteTaskQueue {
    pool: SqlitePool,
}

impl SqliteTaskQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the queue table if it doesn't exist.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queue_tasks (
                id TEXT PRIMARY KEY,
                task_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'queued',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .with_context(|| "failed to create queue_tasks table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_queue_status ON queue_tasks(status, task_type)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl TaskQueue for SqliteTaskQueue {
    async fn enqueue(&self, task_type: &str, payload: Value) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query("INSERT INTO queue_tasks (id, task_type, payload) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(task_type)
            .bind(payload.to_string())
            .execute(&self.pool)
            .await
            .map_err(|error| QueueError::Enqueue {
                task_type: task_type.to_string(),
                reason: error.to_string(),
            })?;

        tracing::debug!(task_id = %id, task_type, "task enqueued");
        Ok(id)
    }
}

/// Typed enqueue helpers for the two indexer digesters.
#[derive(Clone)]
pub struct IndexQueue {
    queue: Arc<dyn TaskQueue>,
}

impl IndexQueue {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self { queue }
    }

    pub async fn enqueue_keyword(&self, doc_ids: &[String]) -> Result<Option<String>> {
        self.enqueue(TASK_INDEX_KEYWORD, doc_ids).await
    }

    pub async fn enqueue_semantic(&self, doc_ids: &[String]) -> Result<Option<String>> {
        self.enqueue(TASK_INDEX_SEMANTIC, doc_ids).await
    }

    async fn enqueue(&self, task_type: &str, doc_ids: &[String]) -> Result<Option<String>> {
        if doc_ids.is_empty() {
            return Ok(None);
        }

        let payload = serde_json::json!({ "documents": doc_ids });
        self.queue.enqueue(task_type, payload).await.map(Some)
    }
}

impl std::fmt::Debug for IndexQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexQueue").finish_non_exhaustive()
    }
}
