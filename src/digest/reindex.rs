//! Shared re-index trigger for the search digesters.

use crate::catalog::{DigestRecord, DigestStatus, FileRecord};
use crate::digest::text_source::{DOC_TO_MARKDOWN, IMAGE_OCR, URL_CRAWL_CONTENT, URL_CRAWL_SUMMARY};

/// Digests whose update makes the previously pushed document stale.
const WATCHED_SOURCES: &[&str] = &[
    URL_CRAWL_CONTENT,
    DOC_TO_MARKDOWN,
    IMAGE_OCR,
    URL_CRAWL_SUMMARY,
    "tags",
];

/// Whether the index output named `index_output` is due for a fresh push.
///
/// True when the index has never run, when its prior run didn't stick
/// (todo/failed), or when the file or any watched source digest changed
/// after the prior push.
pub fn needs_reindex(file: &FileRecord, digests: &[DigestRecord], index_output: &str) -> bool {
    let Some(prior) = digests
        .iter()
        .find(|record| record.digester == index_output)
    else {
        return true;
    };

    if matches!(prior.status, DigestStatus::Todo | DigestStatus::Failed) {
        return true;
    }

    if let Some(modified_at) = file.modified_at
        && modified_at > prior.updated_at
    {
        return true;
    }

    digests.iter().any(|record| {
        WATCHED_SOURCES.contains(&record.digester.as_str()) && record.updated_at > prior.updated_at
    })
}
