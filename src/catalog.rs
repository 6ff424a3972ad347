//! Persistent metadata catalog: file records, digest rows, advisory locks.

pub mod digests;
pub mod files;
pub mod lock;
pub mod schema;

pub use digests::{DigestPatch, DigestRecord, DigestStatus, DigestStore};
pub use files::{FileRecord, FileStore, UpsertFileInput};
pub use lock::LockStore;

use crate::error::Result;
use sqlx::SqlitePool;

/// Facade bundling the catalog stores over one SQLite pool.
#[derive(Debug, Clone)]
pub struct Catalog {
    pool: SqlitePool,
    pub files: FileStore,
    pub digests: DigestStore,
    pub locks: LockStore,
}

impl Catalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            files: FileStore::new(pool.clone()),
            digests: DigestStore::new(pool.clone()),
            locks: LockStore::new(pool.clone()),
            pool,
        }
    }

    /// Create the catalog tables and indices if they don't exist.
    pub async fn initialize(&self) -> Result<()> {
        schema::initialize(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
