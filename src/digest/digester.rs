//! The digester contract and its output types.

use crate::PipelineDeps;
use crate::catalog::{DigestRecord, FileRecord};
use crate::error::Result;
use async_trait::async_trait;

/// One output a digester may write, declared up front.
///
/// The screenshot flag drives the file's denormalized screenshot pointer; it
/// is explicit here rather than inferred from the output name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSpec {
    pub name: &'static str,
    pub is_screenshot: bool,
}

impl OutputSpec {
    pub const fn content(name: &'static str) -> Self {
        Self {
            name,
            is_screenshot: false,
        }
    }

    pub const fn screenshot(name: &'static str) -> Self {
        Self {
            name,
            is_screenshot: true,
        }
    }
}

/// Final state a digester reports for one of its outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    Completed,
    Skipped,
    Failed,
}

/// One produced output, persisted by the coordinator onto the matching row.
#[derive(Debug, Clone)]
pub struct DigestOutput {
    pub name: &'static str,
    pub status: OutputStatus,
    pub content: Option<String>,
    pub blob_key: Option<String>,
    pub error: Option<String>,
}

impl DigestOutput {
    pub fn completed(name: &'static str) -> Self {
        Self {
            name,
            status: OutputStatus::Completed,
            content: None,
            blob_key: None,
            error: None,
        }
    }

    pub fn skipped(name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            name,
            status: OutputStatus::Skipped,
            content: None,
            blob_key: None,
            error: Some(reason.into()),
        }
    }

    pub fn failed(name: &'static str, error: impl Into<String>) -> Self {
        Self {
            name,
            status: OutputStatus::Failed,
            content: None,
            blob_key: None,
            error: Some(error.into()),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_blob_key(mut self, blob_key: impl Into<String>) -> Self {
        self.blob_key = Some(blob_key.into());
        self
    }
}

/// Everything a digester may look at while deciding and running.
///
/// Digesters read file metadata, the file's current digest rows, and the
/// shared dependencies; all row writes go through the coordinator.
pub struct DigestContext<'a> {
    pub file: &'a FileRecord,
    pub digests: &'a [DigestRecord],
    pub deps: &'a PipelineDeps,
}

impl DigestContext<'_> {
    /// The file's row for a given output name, if any.
    pub fn digest(&self, name: &str) -> Option<&DigestRecord> {
        self.digests.iter().find(|record| record.digester == name)
    }

    /// Read the raw file bytes from the data root.
    pub async fn read_file(&self) -> Result<Vec<u8>> {
        let path = self.deps.absolute_path(&self.file.path);
        Ok(tokio::fs::read(&path).await?)
    }
}

/// An independent unit of enrichment over a single file.
#[async_trait]
pub trait Digester: Send + Sync + 'static {
    /// Stable identifier; doubles as the row name for single-output
    /// digesters.
    fn name(&self) -> &'static str;

    /// Human-readable label for logs and UI badges.
    fn label(&self) -> &'static str;

    /// Declared outputs. Defaults to the singleton content output named
    /// after the digester.
    fn outputs(&self) -> Vec<OutputSpec> {
        vec![OutputSpec::content(self.name())]
    }

    /// Cheap applicability predicate. May inspect metadata and existing
    /// rows; must not call external services.
    async fn applies(&self, ctx: &DigestContext<'_>) -> Result<bool>;

    /// Produce outputs. Omitted declared outputs are marked skipped by the
    /// coordinator.
    async fn run(&self, ctx: &DigestContext<'_>) -> Result<Vec<DigestOutput>>;
}
