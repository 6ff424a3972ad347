//! The reference digester set.
//!
//! Registration order is load-bearing: producers (crawl, conversion, OCR,
//! speech) come first, AI consumers (summary, tags, slug) follow, and the
//! search indexers run last so they observe everything else.

pub mod doc_markdown;
pub mod doc_screenshot;
pub mod image_ocr;
pub mod search_keyword;
pub mod search_semantic;
pub mod slug;
pub mod speech;
pub mod tags;
pub mod url_crawl;
pub mod url_summary;

pub use doc_markdown::DocMarkdownDigester;
pub use doc_screenshot::DocScreenshotDigester;
pub use image_ocr::ImageOcrDigester;
pub use search_keyword::SearchKeywordDigester;
pub use search_semantic::SearchSemanticDigester;
pub use slug::SlugDigester;
pub use speech::SpeechDigester;
pub use tags::TagsDigester;
pub use url_crawl::UrlCrawlDigester;
pub use url_summary::UrlSummaryDigester;

use crate::digest::Registry;
use crate::error::Result;
use std::sync::Arc;

/// Build the standard registry in its canonical order.
pub fn default_registry() -> Result<Registry> {
    let mut registry = Registry::new();
    registry.register(Arc::new(UrlCrawlDigester))?;
    registry.register(Arc::new(DocMarkdownDigester))?;
    registry.register(Arc::new(DocScreenshotDigester))?;
    registry.register(Arc::new(ImageOcrDigester))?;
    registry.register(Arc::new(SpeechDigester))?;
    registry.register(Arc::new(UrlSummaryDigester))?;
    registry.register(Arc::new(TagsDigester))?;
    registry.register(Arc::new(SlugDigester))?;
    registry.register(Arc::new(SearchKeywordDigester))?;
    registry.register(Arc::new(SearchSemanticDigester))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob;
    use crate::catalog::DigestStatus;
    use crate::digest::selection::select_files_needing_work;
    use crate::digest::testing::{StubCrawlGateway, TestPipeline};
    use crate::digest::{CoordinateOptions, MAX_ATTEMPTS_SUFFIX, NOT_APPLICABLE, ensure};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn default_registry_has_the_canonical_order() {
        let registry = default_registry().expect("registry should build");

        assert_eq!(
            registry.all_output_names(),
            vec![
                "url-crawl-content",
                "url-crawl-screenshot",
                "doc-to-markdown",
                "doc-to-screenshot",
                "image-ocr",
                "speech-recognition",
                "url-crawl-summary",
                "tags",
                "slug",
                "search-keyword",
                "search-semantic",
            ]
        );
        assert!(registry.is_screenshot_output("url-crawl-screenshot"));
        assert!(registry.is_screenshot_output("doc-to-screenshot"));
        assert!(!registry.is_screenshot_output("doc-to-markdown"));
    }

    async fn statuses(pipeline: &TestPipeline, path: &str) -> Vec<(String, DigestStatus)> {
        pipeline
            .deps
            .catalog
            .digests
            .list_for_file(path)
            .await
            .expect("list should succeed")
            .into_iter()
            .map(|row| (row.digester, row.status))
            .collect()
    }

    fn status_of(rows: &[(String, DigestStatus)], name: &str) -> DigestStatus {
        rows.iter()
            .find(|(digester, _)| digester == name)
            .map(|(_, status)| *status)
            .unwrap_or_else(|| panic!("no row for {name}"))
    }

    #[tokio::test]
    async fn url_capture_flows_through_the_whole_pipeline() {
        let pipeline = TestPipeline::new().await;
        let path = "inbox/note.txt";
        pipeline
            .add_text_file(path, "https://example.com/article")
            .await;

        pipeline
            .coordinator()
            .process(path, CoordinateOptions::default())
            .await
            .expect("pass should succeed");

        let rows = statuses(&pipeline, path).await;
        assert_eq!(status_of(&rows, "url-crawl-content"), DigestStatus::Completed);
        assert_eq!(status_of(&rows, "url-crawl-screenshot"), DigestStatus::Completed);
        assert_eq!(status_of(&rows, "doc-to-markdown"), DigestStatus::Skipped);
        assert_eq!(status_of(&rows, "url-crawl-summary"), DigestStatus::Completed);
        assert_eq!(status_of(&rows, "tags"), DigestStatus::Completed);
        assert_eq!(status_of(&rows, "slug"), DigestStatus::Completed);
        assert_eq!(status_of(&rows, "search-keyword"), DigestStatus::Completed);
        assert_eq!(status_of(&rows, "search-semantic"), DigestStatus::Completed);

        // Content payload shape.
        let content = pipeline.digest(path, "url-crawl-content").await;
        let payload: serde_json::Value =
            serde_json::from_str(content.content.as_deref().expect("content should exist"))
                .expect("content should be JSON");
        assert_eq!(payload["url"], "https://example.com/article");
        assert!(
            payload["markdown"]
                .as_str()
                .expect("markdown should be a string")
                .len()
                >= 100
        );

        // Screenshot blob exists and the file points at it.
        let screenshot = pipeline.digest(path, "url-crawl-screenshot").await;
        let expected_key = blob::blob_key(path, "url-crawl-screenshot", "screenshot.png");
        assert_eq!(screenshot.blob_key.as_deref(), Some(expected_key.as_str()));
        assert!(
            pipeline
                .deps
                .blobs
                .exists(&expected_key)
                .await
                .expect("exists should succeed")
        );
        let file = pipeline.file(path).await;
        assert_eq!(file.screenshot_key.as_deref(), Some(expected_key.as_str()));

        // Tags and summary carry real payloads.
        let summary = pipeline.digest(path, "url-crawl-summary").await;
        let payload: serde_json::Value =
            serde_json::from_str(summary.content.as_deref().expect("summary should exist"))
                .expect("summary should be JSON");
        assert!(!payload["summary"].as_str().expect("summary string").is_empty());

        let tags = pipeline.digest(path, "tags").await;
        let tags: Vec<String> =
            serde_json::from_str(tags.content.as_deref().expect("tags should exist"))
                .expect("tags should be a JSON array");
        assert!(!tags.is_empty());

        // Preview denormalization came from the crawl markdown.
        assert!(file.preview.expect("preview should be set").contains("Example Article"));
    }

    #[tokio::test]
    async fn pdf_flows_through_the_document_digesters() {
        let pipeline = TestPipeline::new().await;
        let path = "inbox/paper.pdf";
        pipeline.add_file(path, b"%PDF-1.7 stub bytes").await;

        pipeline
            .coordinator()
            .process(path, CoordinateOptions::default())
            .await
            .expect("pass should succeed");

        let rows = statuses(&pipeline, path).await;
        assert_eq!(status_of(&rows, "url-crawl-content"), DigestStatus::Skipped);
        assert_eq!(status_of(&rows, "doc-to-markdown"), DigestStatus::Completed);
        assert_eq!(status_of(&rows, "doc-to-screenshot"), DigestStatus::Completed);
        assert_eq!(status_of(&rows, "url-crawl-summary"), DigestStatus::Skipped);
        assert_eq!(status_of(&rows, "tags"), DigestStatus::Completed);
        assert_eq!(status_of(&rows, "slug"), DigestStatus::Completed);
        assert_eq!(status_of(&rows, "search-keyword"), DigestStatus::Completed);
        assert_eq!(status_of(&rows, "search-semantic"), DigestStatus::Completed);

        let skipped = pipeline.digest(path, "url-crawl-content").await;
        assert_eq!(skipped.error.as_deref(), Some(NOT_APPLICABLE));

        let preview_key = blob::blob_key(path, "doc-to-screenshot", "preview.png");
        assert!(
            pipeline
                .deps
                .blobs
                .exists(&preview_key)
                .await
                .expect("exists should succeed")
        );
        let file = pipeline.file(path).await;
        assert_eq!(file.screenshot_key.as_deref(), Some(preview_key.as_str()));
    }

    #[tokio::test]
    async fn audio_transcript_drives_the_text_digesters() {
        let pipeline = TestPipeline::new().await;
        let path = "inbox/voice.webm";
        pipeline.add_file(path, b"webm-ish audio bytes").await;

        pipeline
            .coordinator()
            .process(path, CoordinateOptions::default())
            .await
            .expect("pass should succeed");

        let rows = statuses(&pipeline, path).await;
        assert_eq!(
            status_of(&rows, "speech-recognition"),
            DigestStatus::Completed
        );
        assert_eq!(status_of(&rows, "tags"), DigestStatus::Completed);
        assert_eq!(status_of(&rows, "slug"), DigestStatus::Completed);
        assert_eq!(status_of(&rows, "search-keyword"), DigestStatus::Completed);
        assert_eq!(status_of(&rows, "search-semantic"), DigestStatus::Completed);

        let transcript = pipeline.digest(path, "speech-recognition").await;
        let payload: serde_json::Value = serde_json::from_str(
            transcript
                .content
                .as_deref()
                .expect("transcript should exist"),
        )
        .expect("transcript should be JSON");
        assert!(
            !payload["transcript"]
                .as_str()
                .expect("transcript string")
                .is_empty()
        );
        assert!(payload["segments"].is_array());

        // The slug names its text source.
        let slug = pipeline.digest(path, "slug").await;
        let payload: serde_json::Value =
            serde_json::from_str(slug.content.as_deref().expect("slug should exist"))
                .expect("slug should be JSON");
        assert_eq!(payload["source"], "speech-recognition");
    }

    #[tokio::test]
    async fn file_without_text_sources_settles_entirely() {
        let pipeline = TestPipeline::new().await;
        let path = "inbox/data.bin";
        pipeline.add_file(path, &[0u8, 1, 2, 3, 255]).await;

        pipeline
            .coordinator()
            .process(path, CoordinateOptions::default())
            .await
            .expect("pass should succeed");

        let rows = statuses(&pipeline, path).await;
        assert!(
            rows.iter()
                .all(|(_, status)| *status == DigestStatus::Skipped),
            "expected every digest skipped, got {rows:?}"
        );

        let selected = select_files_needing_work(
            &pipeline.deps.catalog,
            &pipeline.registry,
            &pipeline.deps.config.digest,
            10,
        )
        .await
        .expect("selection should succeed");
        assert!(selected.is_empty());
    }

    #[tokio::test]
    async fn crawl_failures_retry_until_recovery() {
        let crawl = Arc::new(StubCrawlGateway {
            failures_remaining: Arc::new(AtomicUsize::new(3)),
            ..StubCrawlGateway::default()
        });
        let pipeline = TestPipeline::with_crawl(crawl).await;
        let path = "inbox/note.txt";
        pipeline
            .add_text_file(path, "https://example.com/article")
            .await;
        let coordinator = pipeline.coordinator();

        for attempt in 1..=3 {
            coordinator
                .process(path, CoordinateOptions::default())
                .await
                .expect("pass should succeed");
            let row = pipeline.digest(path, "url-crawl-content").await;
            assert_eq!(row.status, DigestStatus::Failed);
            assert_eq!(row.attempts, attempt);
            assert!(!row.error.as_deref().unwrap_or("").ends_with(MAX_ATTEMPTS_SUFFIX));
        }

        // The fourth and last attempt succeeds and resets the counter.
        coordinator
            .process(path, CoordinateOptions::default())
            .await
            .expect("pass should succeed");
        let row = pipeline.digest(path, "url-crawl-content").await;
        assert_eq!(row.status, DigestStatus::Completed);
        assert_eq!(row.attempts, 0);
        assert_eq!(row.error, None);
    }

    #[tokio::test]
    async fn reset_clears_state_and_rerun_reproduces_it() {
        let pipeline = TestPipeline::new().await;
        let path = "inbox/note.txt";
        pipeline
            .add_text_file(path, "https://example.com/article")
            .await;
        let coordinator = pipeline.coordinator();

        coordinator
            .process(path, CoordinateOptions::default())
            .await
            .expect("first pass should succeed");

        let before = pipeline
            .deps
            .catalog
            .digests
            .list_for_file(path)
            .await
            .expect("list should succeed");

        coordinator
            .process(
                path,
                CoordinateOptions {
                    reset: true,
                    digester: None,
                },
            )
            .await
            .expect("reset pass should succeed");

        let after = pipeline
            .deps
            .catalog
            .digests
            .list_for_file(path)
            .await
            .expect("list should succeed");

        for row in &before {
            let rerun = after
                .iter()
                .find(|candidate| candidate.digester == row.digester)
                .expect("row should survive the reset");
            assert_eq!(rerun.status, row.status, "{} status", row.digester);

            // Deterministic digesters reproduce their payloads; the search
            // digests embed a fresh task id.
            if !row.digester.starts_with("search-") {
                assert_eq!(rerun.content, row.content, "{} content", row.digester);
                assert_eq!(rerun.blob_key, row.blob_key, "{} blob", row.digester);
            }
        }

        let file = pipeline.file(path).await;
        assert_eq!(
            file.screenshot_key.as_deref(),
            Some(blob::blob_key(path, "url-crawl-screenshot", "screenshot.png").as_str())
        );
    }

    #[tokio::test]
    async fn unregistering_a_digester_unblocks_its_files() {
        let pipeline = TestPipeline::new().await;
        let path = "inbox/paper.pdf";
        pipeline.add_file(path, b"%PDF-1.7 stub bytes").await;

        pipeline
            .coordinator()
            .process(path, CoordinateOptions::default())
            .await
            .expect("pass should succeed");

        // Knock the preview digest back to todo: the file is now blocked
        // only on doc-to-screenshot.
        let row = pipeline.digest(path, "doc-to-screenshot").await;
        pipeline
            .deps
            .catalog
            .digests
            .reset_row(&row.id)
            .await
            .expect("reset should succeed");

        // Next startup ships without the preview digester.
        let mut reduced = crate::digest::Registry::new();
        reduced.register(Arc::new(UrlCrawlDigester)).expect("register");
        reduced.register(Arc::new(DocMarkdownDigester)).expect("register");
        reduced.register(Arc::new(ImageOcrDigester)).expect("register");
        reduced.register(Arc::new(SpeechDigester)).expect("register");
        reduced.register(Arc::new(UrlSummaryDigester)).expect("register");
        reduced.register(Arc::new(TagsDigester)).expect("register");
        reduced.register(Arc::new(SlugDigester)).expect("register");
        reduced.register(Arc::new(SearchKeywordDigester)).expect("register");
        reduced.register(Arc::new(SearchSemanticDigester)).expect("register");

        ensure::ensure_placeholders(&pipeline.deps.catalog, &reduced, path)
            .await
            .expect("ensure should succeed");

        let row = pipeline.digest(path, "doc-to-screenshot").await;
        assert_eq!(row.status, DigestStatus::Skipped);

        let selected = select_files_needing_work(
            &pipeline.deps.catalog,
            &reduced,
            &pipeline.deps.config.digest,
            10,
        )
        .await
        .expect("selection should succeed");
        assert!(selected.is_empty());
    }
}
