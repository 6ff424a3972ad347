//! Keyword-index hand-off: enqueue the document for the external keyword
//! store. The digester's job ends at the enqueue; the handler owns delivery.

use crate::digest::digester::{DigestContext, DigestOutput, Digester};
use crate::digest::reindex::needs_reindex;
use crate::digest::text_source::{self, TextSourceOptions};
use crate::error::Result;
use async_trait::async_trait;

pub const SEARCH_KEYWORD: &str = "search-keyword";

pub struct SearchKeywordDigester;

#[async_trait]
impl Digester for SearchKeywordDigester {
    fn name(&self) -> &'static str {
        SEARCH_KEYWORD
    }

    fn label(&self) -> &'static str {
        "Keyword search indexing"
    }

    async fn applies(&self, ctx: &DigestContext<'_>) -> Result<bool> {
        let has_text = text_source::has_any_text_source(
            ctx.file,
            ctx.digests,
            TextSourceOptions::default(),
        );

        Ok(has_text && needs_reindex(ctx.file, ctx.digests, SEARCH_KEYWORD))
    }

    async fn run(&self, ctx: &DigestContext<'_>) -> Result<Vec<DigestOutput>> {
        let Some(task_id) = ctx
            .deps
            .index_queue
            .enqueue_keyword(&[ctx.file.path.clone()])
            .await?
        else {
            return Ok(Vec::new());
        };

        tracing::debug!(path = %ctx.file.path, task_id = %task_id, "keyword indexing enqueued");

        let content = serde_json::json!({ "task_id": task_id });
        Ok(vec![
            DigestOutput::completed(SEARCH_KEYWORD).with_content(content.to_string()),
        ])
    }
}
