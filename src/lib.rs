//! lifedb: a personal life database whose background pipeline enriches every
//! captured file with derived representations and schedules search indexing.

pub mod blob;
pub mod catalog;
pub mod config;
pub mod digest;
pub mod error;
pub mod gateway;
pub mod queue;
pub mod scan;
pub mod watcher;

pub use error::{Error, Result};

use std::sync::Arc;

/// Shared dependency bundle threaded through the digest pipeline.
///
/// Gateways are `None` when the corresponding external service is not
/// configured; digesters that need one report not-applicable instead of
/// failing.
#[derive(Clone)]
pub struct PipelineDeps {
    pub catalog: catalog::Catalog,
    pub blobs: blob::BlobStore,
    pub crawl: Option<Arc<dyn gateway::CrawlGateway>>,
    pub media: Option<Arc<dyn gateway::MediaGateway>>,
    pub llm: Option<Arc<dyn gateway::LlmGateway>>,
    pub index_queue: queue::IndexQueue,
    pub config: Arc<config::Config>,
}

impl PipelineDeps {
    /// Absolute path of a catalog-relative file path under the data root.
    pub fn absolute_path(&self, relative: &str) -> std::path::PathBuf {
        self.config.data_root.join(relative)
    }
}

impl std::fmt::Debug for PipelineDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDeps")
            .field("data_root", &self.config.data_root)
            .field("crawl", &self.crawl.is_some())
            .field("media", &self.media.is_some())
            .field("llm", &self.llm.is_some())
            .finish_non_exhaustive()
    }
}
