//! Shared fixtures and stub gateways for pipeline tests.

use crate::PipelineDeps;
use crate::blob::BlobStore;
use crate::catalog::{Catalog, DigestRecord, FileRecord, UpsertFileInput};
use crate::config::{Config, DigestConfig, GatewayConfig};
use crate::digest::digester::Digester;
use crate::digest::{Coordinator, Registry, digesters, ensure};
use crate::error::{GatewayError, Result};
use crate::gateway::{CrawlGateway, CrawlResult, LlmGateway, MediaGateway, Transcript, TranscriptSegment};
use crate::queue::{IndexQueue, SqliteTaskQueue};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Minimal PNG header, good enough to stand in for screenshot bytes.
pub(crate) const PNG_STUB: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Crawl stub. Fails with a 500 until `failures_remaining` drains, then
/// returns fixed markdown plus a screenshot.
pub(crate) struct StubCrawlGateway {
    pub markdown: String,
    pub title: Option<String>,
    pub screenshot: Option<Vec<u8>>,
    pub failures_remaining: Arc<AtomicUsize>,
}

impl Default for StubCrawlGateway {
    fn default() -> Self {
        Self {
            markdown: "# Example Article\n\nA captured page with enough text to summarize, \
                       tag, and index. It talks about note-taking systems at length."
                .to_string(),
            title: Some("Example Article".to_string()),
            screenshot: Some(PNG_STUB.to_vec()),
            failures_remaining: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl CrawlGateway for StubCrawlGateway {
    async fn crawl(&self, url: &str) -> Result<CrawlResult> {
        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(GatewayError::Status {
                status: 500,
                body: "crawl backend unavailable".to_string(),
            }
            .into());
        }

        Ok(CrawlResult {
            url: url.to_string(),
            markdown: self.markdown.clone(),
            title: self.title.clone(),
            screenshot: self.screenshot.clone(),
        })
    }
}

/// Media stub with deterministic conversions.
pub(crate) struct StubMediaGateway;

#[async_trait]
impl MediaGateway for StubMediaGateway {
    async fn document_to_markdown(&self, filename: &str, _bytes: &[u8]) -> Result<String> {
        Ok(format!(
            "# {filename}\n\nConverted document body with plenty of prose for downstream digesters."
        ))
    }

    async fn document_preview(&self, _filename: &str, _bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(PNG_STUB.to_vec())
    }

    async fn image_ocr(&self, filename: &str, _bytes: &[u8]) -> Result<String> {
        Ok(format!("Text recognized inside {filename}"))
    }

    async fn transcribe(&self, _filename: &str, _bytes: &[u8]) -> Result<Transcript> {
        Ok(Transcript {
            transcript: "Remember to water the plants and call the dentist tomorrow.".to_string(),
            segments: vec![TranscriptSegment {
                speaker: Some("speaker-0".to_string()),
                text: "Remember to water the plants and call the dentist tomorrow.".to_string(),
                start_secs: 0.0,
                end_secs: 4.2,
            }],
        })
    }
}

/// LLM stub answering by prompt intent.
pub(crate) struct StubLlmGateway;

#[async_trait]
impl LlmGateway for StubLlmGateway {
    async fn complete(&self, system: &str, _prompt: &str) -> Result<String> {
        if system.contains("tags") {
            Ok(r#"["notes", "reading"]"#.to_string())
        } else if system.contains("summar") {
            Ok("A short summary of the captured content.".to_string())
        } else if system.contains("title") {
            Ok("Captured Example Article".to_string())
        } else {
            Ok("ok".to_string())
        }
    }
}

/// An in-memory catalog, a temp blob store, stub gateways, and a registry.
pub(crate) struct TestPipeline {
    pub deps: PipelineDeps,
    pub registry: Arc<Registry>,
    pub data_dir: tempfile::TempDir,
    _blob_dir: tempfile::TempDir,
}

impl TestPipeline {
    /// Full default registry with well-behaved stub gateways.
    pub async fn new() -> Self {
        let registry =
            Arc::new(digesters::default_registry().expect("default registry should build"));
        Self::assemble(registry, Arc::new(StubCrawlGateway::default())).await
    }

    pub async fn with_registry(registry: Arc<Registry>) -> Self {
        Self::assemble(registry, Arc::new(StubCrawlGateway::default())).await
    }

    pub async fn with_crawl(crawl: Arc<dyn CrawlGateway>) -> Self {
        let registry =
            Arc::new(digesters::default_registry().expect("default registry should build"));
        Self::assemble(registry, crawl).await
    }

    async fn assemble(registry: Arc<Registry>, crawl: Arc<dyn CrawlGateway>) -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite should connect");

        let catalog = Catalog::new(pool.clone());
        catalog
            .initialize()
            .await
            .expect("catalog schema should be created");

        let queue = SqliteTaskQueue::new(pool);
        queue
            .initialize()
            .await
            .expect("queue schema should be created");

        let data_dir = tempfile::tempdir().expect("data dir should be created");
        let blob_dir = tempfile::tempdir().expect("blob dir should be created");

        let config = Config {
            data_root: data_dir.path().to_path_buf(),
            digest: DigestConfig::default(),
            gateways: GatewayConfig::default(),
        };

        let deps = PipelineDeps {
            catalog,
            blobs: BlobStore::new(blob_dir.path()),
            crawl: Some(crawl),
            media: Some(Arc::new(StubMediaGateway)),
            llm: Some(Arc::new(StubLlmGateway)),
            index_queue: IndexQueue::new(Arc::new(queue)),
            config: Arc::new(config),
        };

        Self {
            deps,
            registry,
            data_dir,
            _blob_dir: blob_dir,
        }
    }

    pub fn coordinator(&self) -> Coordinator {
        Coordinator::new(self.deps.clone(), self.registry.clone())
    }

    /// Write a file under the data root, record it, and materialize
    /// placeholders, the same way the scanner handles a new capture.
    pub async fn add_file(&self, path: &str, bytes: &[u8]) -> FileRecord {
        let absolute = self.data_dir.path().join(path);
        if let Some(parent) = absolute.parent() {
            std::fs::create_dir_all(parent).expect("parent dirs should be created");
        }
        std::fs::write(&absolute, bytes).expect("file should be written");

        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        let mime_type = mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string());

        let record = self
            .deps
            .catalog
            .files
            .upsert(UpsertFileInput {
                path: path.to_string(),
                name,
                is_folder: false,
                size: bytes.len() as i64,
                mime_type,
                content_hash: Some(crate::scan::content_hash(bytes)),
                modified_at: Some(chrono::Utc::now().naive_utc()),
            })
            .await
            .expect("file record should upsert");

        ensure::ensure_placeholders(&self.deps.catalog, &self.registry, path)
            .await
            .expect("placeholders should materialize");

        record
    }

    pub async fn add_text_file(&self, path: &str, contents: &str) -> FileRecord {
        self.add_file(path, contents.as_bytes()).await
    }

    pub async fn file(&self, path: &str) -> FileRecord {
        self.deps
            .catalog
            .files
            .get_by_path(path)
            .await
            .expect("file fetch should succeed")
            .expect("file record should exist")
    }

    pub async fn digest(&self, path: &str, name: &str) -> DigestRecord {
        self.deps
            .catalog
            .digests
            .get_by_file_and_name(path, name)
            .await
            .expect("digest fetch should succeed")
            .expect("digest row should exist")
    }
}

/// Build a registry from an explicit digester list.
pub(crate) fn registry_with(digesters: &[Arc<dyn Digester>]) -> Arc<Registry> {
    let mut registry = Registry::new();
    for digester in digesters {
        registry
            .register(digester.clone())
            .expect("registration should succeed");
    }
    Arc::new(registry)
}
