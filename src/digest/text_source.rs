//! Best-text resolution across content-producing digesters and raw files.
//!
//! This is the single chokepoint between producers (crawl, conversion, OCR)
//! and consumers (summary, tags, slug, the search indexers): consumers ask
//! for "the file's text" and never learn where it came from.

use crate::catalog::{DigestRecord, DigestStatus, FileRecord};
use crate::error::Result;
use std::path::Path;

/// Output name of the URL crawler's content digest.
pub const URL_CRAWL_CONTENT: &str = "url-crawl-content";
/// Output name of the document conversion digest.
pub const DOC_TO_MARKDOWN: &str = "doc-to-markdown";
/// Output name of the image OCR digest.
pub const IMAGE_OCR: &str = "image-ocr";
/// Output name of the speech recognition digest.
pub const SPEECH_RECOGNITION: &str = "speech-recognition";
/// Output name of the URL summary digest.
pub const URL_CRAWL_SUMMARY: &str = "url-crawl-summary";

/// Extensions read directly as text when no digest supplies content.
pub const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "json", "jsonl", "csv", "tsv", "log", "xml", "yaml", "yml", "toml",
    "rst", "org", "html", "htm",
];

/// Where a file's text representation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSourceKind {
    UrlCrawl,
    DocMarkdown,
    Ocr,
    Speech,
    File,
}

impl TextSourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TextSourceKind::UrlCrawl => "url-crawl",
            TextSourceKind::DocMarkdown => "doc-to-markdown",
            TextSourceKind::Ocr => "ocr",
            TextSourceKind::Speech => "speech-recognition",
            TextSourceKind::File => "file",
        }
    }
}

/// A file's best current plain-text representation.
#[derive(Debug, Clone)]
pub struct TextSource {
    pub text: String,
    pub kind: TextSourceKind,
}

/// Thresholds for [`has_any_text_source`]. Digest-backed sources must carry
/// at least `min_digest_chars`; a raw file must be at least `min_file_bytes`.
#[derive(Debug, Clone, Copy)]
pub struct TextSourceOptions {
    pub min_digest_chars: usize,
    pub min_file_bytes: u64,
}

impl Default for TextSourceOptions {
    fn default() -> Self {
        Self {
            min_digest_chars: 1,
            min_file_bytes: 1,
        }
    }
}

/// Resolve the file's text, reading the raw file from `data_root` as the
/// last resort.
pub async fn resolve(
    file: &FileRecord,
    digests: &[DigestRecord],
    data_root: &Path,
) -> Result<Option<TextSource>> {
    if let Some(text) = crawl_markdown(digests) {
        return Ok(Some(TextSource {
            text,
            kind: TextSourceKind::UrlCrawl,
        }));
    }

    if let Some(text) = doc_markdown(digests) {
        return Ok(Some(TextSource {
            text,
            kind: TextSourceKind::DocMarkdown,
        }));
    }

    if let Some(text) = ocr_text(digests) {
        return Ok(Some(TextSource {
            text,
            kind: TextSourceKind::Ocr,
        }));
    }

    if let Some(text) = transcript_text(digests) {
        return Ok(Some(TextSource {
            text,
            kind: TextSourceKind::Speech,
        }));
    }

    if !file.is_folder && is_text_like(file) {
        let absolute = data_root.join(&file.path);
        match tokio::fs::read(&absolute).await {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                if !text.trim().is_empty() {
                    return Ok(Some(TextSource {
                        text,
                        kind: TextSourceKind::File,
                    }));
                }
            }
            Err(error) => {
                tracing::debug!(path = %file.path, %error, "failed to read raw file for text source");
            }
        }
    }

    Ok(None)
}

/// Same resolution order as [`resolve`] without materializing the text or
/// touching the filesystem.
pub fn has_any_text_source(
    file: &FileRecord,
    digests: &[DigestRecord],
    options: TextSourceOptions,
) -> bool {
    let digest_len = |text: Option<String>| {
        text.map(|text| text.chars().count())
            .is_some_and(|len| len >= options.min_digest_chars)
    };

    if digest_len(crawl_markdown(digests))
        || digest_len(doc_markdown(digests))
        || digest_len(ocr_text(digests))
        || digest_len(transcript_text(digests))
    {
        return true;
    }

    !file.is_folder && is_text_like(file) && file.size as u64 >= options.min_file_bytes
}

/// The file's AI summary, preferring the URL summary over a generic one.
pub fn summary_text(digests: &[DigestRecord]) -> Option<String> {
    for name in [URL_CRAWL_SUMMARY, "summary"] {
        if let Some(value) = completed_json(digests, name)
            && let Some(summary) = value.get("summary").and_then(|v| v.as_str())
            && !summary.trim().is_empty()
        {
            return Some(summary.to_string());
        }
    }
    None
}

/// Whether the raw file can be read as text, by MIME type or extension.
pub fn is_text_like(file: &FileRecord) -> bool {
    if let Some(mime) = &file.mime_type {
        if mime.starts_with("text/") {
            return true;
        }
        if matches!(
            mime.as_str(),
            "application/json" | "application/xml" | "application/x-yaml" | "application/toml"
        ) {
            return true;
        }
    }

    extension(&file.path)
        .map(|ext| TEXT_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Completed crawl content's markdown field.
pub fn crawl_markdown(digests: &[DigestRecord]) -> Option<String> {
    completed_json(digests, URL_CRAWL_CONTENT)?
        .get("markdown")
        .and_then(|v| v.as_str())
        .filter(|markdown| !markdown.trim().is_empty())
        .map(str::to_string)
}

/// Completed document conversion's markdown field.
fn doc_markdown(digests: &[DigestRecord]) -> Option<String> {
    completed_json(digests, DOC_TO_MARKDOWN)?
        .get("markdown")
        .and_then(|v| v.as_str())
        .filter(|markdown| !markdown.trim().is_empty())
        .map(str::to_string)
}

/// Completed speech recognition's transcript field.
fn transcript_text(digests: &[DigestRecord]) -> Option<String> {
    completed_json(digests, SPEECH_RECOGNITION)?
        .get("transcript")
        .and_then(|v| v.as_str())
        .filter(|transcript| !transcript.trim().is_empty())
        .map(str::to_string)
}

/// Completed OCR output; plain text, not JSON.
fn ocr_text(digests: &[DigestRecord]) -> Option<String> {
    digests
        .iter()
        .find(|record| record.digester == IMAGE_OCR && record.status == DigestStatus::Completed)
        .and_then(|record| record.content.clone())
        .filter(|text| !text.trim().is_empty())
}

/// A completed digest's content parsed as JSON. Payload shapes are strict:
/// unparseable content is treated as absent.
fn completed_json(digests: &[DigestRecord], name: &str) -> Option<serde_json::Value> {
    let record = digests
        .iter()
        .find(|record| record.digester == name && record.status == DigestStatus::Completed)?;
    let content = record.content.as_deref()?;

    match serde_json::from_str(content) {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::debug!(digest = %name, %error, "digest content is not valid JSON");
            None
        }
    }
}

fn extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}
