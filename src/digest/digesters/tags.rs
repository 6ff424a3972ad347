//! AI tag extraction over the file's best text source.

use crate::digest::digester::{DigestContext, DigestOutput, Digester};
use crate::digest::text_source::{self, TextSourceOptions};
use crate::error::Result;
use async_trait::async_trait;

pub const TAGS: &str = "tags";

/// Anything shorter carries no taggable signal.
const MIN_TEXT_CHARS: usize = 10;

const MAX_PROMPT_CHARS: usize = 6000;

const SYSTEM: &str = "You extract topic tags from personal notes and documents. Reply with a \
     JSON array of 2 to 8 short lowercase tags and nothing else.";

pub struct TagsDigester;

#[async_trait]
impl Digester for TagsDigester {
    fn name(&self) -> &'static str {
        TAGS
    }

    fn label(&self) -> &'static str {
        "Tags"
    }

    async fn applies(&self, ctx: &DigestContext<'_>) -> Result<bool> {
        if ctx.deps.llm.is_none() {
            return Ok(false);
        }

        Ok(text_source::has_any_text_source(
            ctx.file,
            ctx.digests,
            TextSourceOptions {
                min_digest_chars: MIN_TEXT_CHARS,
                min_file_bytes: MIN_TEXT_CHARS as u64,
            },
        ))
    }

    async fn run(&self, ctx: &DigestContext<'_>) -> Result<Vec<DigestOutput>> {
        let Some(llm) = ctx.deps.llm.as_ref() else {
            return Ok(Vec::new());
        };
        let Some(source) =
            text_source::resolve(ctx.file, ctx.digests, &ctx.deps.config.data_root).await?
        else {
            return Ok(Vec::new());
        };
        if source.text.chars().count() < MIN_TEXT_CHARS {
            return Ok(Vec::new());
        }

        let excerpt: String = source.text.chars().take(MAX_PROMPT_CHARS).collect();
        let response = llm.complete(SYSTEM, &excerpt).await?;
        let tags = parse_tags(&response)
            .ok_or_else(|| anyhow::anyhow!("tag model returned no parseable JSON array"))?;

        if tags.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(path = %ctx.file.path, count = tags.len(), "tags extracted");

        let content = serde_json::to_string(&tags)
            .map_err(|error| anyhow::anyhow!("failed to serialize tags: {error}"))?;
        Ok(vec![DigestOutput::completed(TAGS).with_content(content)])
    }
}

/// Parse the model response as a JSON string array, tolerating code fences.
fn parse_tags(response: &str) -> Option<Vec<String>> {
    let trimmed = response.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|inner| inner.trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();

    let values: Vec<serde_json::Value> = serde_json::from_str(trimmed).ok()?;
    let tags = values
        .into_iter()
        .filter_map(|value| value.as_str().map(str::to_string))
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect();
    Some(tags)
}
