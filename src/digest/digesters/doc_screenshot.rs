//! Document preview: first-page PNG for PDF/office/EPUB files.

use crate::blob;
use crate::digest::digester::{DigestContext, DigestOutput, Digester, OutputSpec};
use crate::digest::digesters::doc_markdown::is_document;
use crate::error::Result;
use async_trait::async_trait;

pub const DOC_TO_SCREENSHOT: &str = "doc-to-screenshot";

pub struct DocScreenshotDigester;

#[async_trait]
impl Digester for DocScreenshotDigester {
    fn name(&self) -> &'static str {
        DOC_TO_SCREENSHOT
    }

    fn label(&self) -> &'static str {
        "Document preview"
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        vec![OutputSpec::screenshot(DOC_TO_SCREENSHOT)]
    }

    async fn applies(&self, ctx: &DigestContext<'_>) -> Result<bool> {
        Ok(ctx.deps.media.is_some() && is_document(ctx.file))
    }

    async fn run(&self, ctx: &DigestContext<'_>) -> Result<Vec<DigestOutput>> {
        let Some(media) = ctx.deps.media.as_ref() else {
            return Ok(Vec::new());
        };
        let bytes = ctx.read_file().await?;

        let preview = media.document_preview(&ctx.file.name, &bytes).await?;
        let key = blob::blob_key(&ctx.file.path, DOC_TO_SCREENSHOT, "preview.png");
        ctx.deps.blobs.put(&key, preview).await?;

        Ok(vec![DigestOutput::completed(DOC_TO_SCREENSHOT).with_blob_key(key)])
    }
}
