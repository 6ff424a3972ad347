//! Top-level error types for lifedb.

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Catalog (files, digests, locks) errors.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("file not found in catalog: {path}")]
    FileNotFound { path: String },

    #[error("digest not found: {id}")]
    DigestNotFound { id: String },

    #[error("invalid digest status in database: {0}")]
    InvalidStatus(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Blob store errors.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("invalid blob key: {key}")]
    InvalidKey { key: String },

    #[error("blob not found: {key}")]
    NotFound { key: String },

    #[error("IO error for blob {key}: {source}")]
    Io {
        key: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// External gateway (crawl, media, LLM) errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway not configured: {0}")]
    NotConfigured(&'static str),

    #[error("gateway request failed: {0}")]
    Request(String),

    #[error("gateway returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("gateway returned malformed payload: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Task queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("failed to enqueue {task_type}: {reason}")]
    Enqueue { task_type: String, reason: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
