//! Document conversion: PDF/office/EPUB to markdown via the media gateway.

use crate::catalog::FileRecord;
use crate::digest::digester::{DigestContext, DigestOutput, Digester};
use crate::digest::text_source::DOC_TO_MARKDOWN;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Extensions handled by the office/document conversion gateway.
pub const DOC_EXTENSIONS: &[&str] =
    &["pdf", "doc", "docx", "ppt", "pptx", "xls", "xlsx", "epub"];

const DOC_MIMES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/epub+zip",
];

/// Shared applicability for the two document digesters.
pub(crate) fn is_document(file: &FileRecord) -> bool {
    if file.is_folder || file.size == 0 {
        return false;
    }

    if let Some(mime) = &file.mime_type
        && DOC_MIMES.contains(&mime.as_str())
    {
        return true;
    }

    Path::new(&file.path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| DOC_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

pub struct DocMarkdownDigester;

#[async_trait]
impl Digester for DocMarkdownDigester {
    fn name(&self) -> &'static str {
        DOC_TO_MARKDOWN
    }

    fn label(&self) -> &'static str {
        "Document to markdown"
    }

    async fn applies(&self, ctx: &DigestContext<'_>) -> Result<bool> {
        Ok(ctx.deps.media.is_some() && is_document(ctx.file))
    }

    async fn run(&self, ctx: &DigestContext<'_>) -> Result<Vec<DigestOutput>> {
        let Some(media) = ctx.deps.media.as_ref() else {
            return Ok(Vec::new());
        };
        let bytes = ctx.read_file().await?;

        let markdown = media.document_to_markdown(&ctx.file.name, &bytes).await?;
        tracing::info!(path = %ctx.file.path, chars = markdown.len(), "document converted to markdown");

        let content = serde_json::json!({ "markdown": markdown });
        Ok(vec![
            DigestOutput::completed(DOC_TO_MARKDOWN).with_content(content.to_string()),
        ])
    }
}
