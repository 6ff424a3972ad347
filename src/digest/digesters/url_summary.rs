//! AI summary of crawled URL content.

use crate::digest::digester::{DigestContext, DigestOutput, Digester};
use crate::digest::text_source::{self, URL_CRAWL_SUMMARY};
use crate::error::Result;
use async_trait::async_trait;

/// Crawled pages shorter than this aren't worth a summary.
const MIN_MARKDOWN_CHARS: usize = 100;

/// Prompt budget; crawled pages can be enormous.
const MAX_PROMPT_CHARS: usize = 8000;

const SYSTEM: &str = "You summarize crawled web pages. Reply with two or three plain sentences \
     capturing what the page is about. No preamble, no markdown.";

pub struct UrlSummaryDigester;

#[async_trait]
impl Digester for UrlSummaryDigester {
    fn name(&self) -> &'static str {
        URL_CRAWL_SUMMARY
    }

    fn label(&self) -> &'static str {
        "URL summary"
    }

    async fn applies(&self, ctx: &DigestContext<'_>) -> Result<bool> {
        if ctx.deps.llm.is_none() {
            return Ok(false);
        }

        Ok(text_source::crawl_markdown(ctx.digests)
            .is_some_and(|markdown| markdown.chars().count() >= MIN_MARKDOWN_CHARS))
    }

    async fn run(&self, ctx: &DigestContext<'_>) -> Result<Vec<DigestOutput>> {
        let Some(llm) = ctx.deps.llm.as_ref() else {
            return Ok(Vec::new());
        };
        let Some(markdown) = text_source::crawl_markdown(ctx.digests) else {
            return Ok(Vec::new());
        };

        let excerpt: String = markdown.chars().take(MAX_PROMPT_CHARS).collect();
        let summary = llm.complete(SYSTEM, &excerpt).await?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Ok(Vec::new());
        }

        let content = serde_json::json!({ "summary": summary });
        Ok(vec![
            DigestOutput::completed(URL_CRAWL_SUMMARY).with_content(content.to_string()),
        ])
    }
}
