//! Slug and display title generation.
//!
//! The title comes from the LLM over the summary (preferred) or the text
//! source; the slug is derived locally so it stays deterministic given a
//! title.

use crate::digest::digester::{DigestContext, DigestOutput, Digester};
use crate::digest::text_source::{self, TextSourceOptions};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::OnceLock;

pub const SLUG: &str = "slug";

const MIN_TEXT_CHARS: usize = 20;

const MAX_PROMPT_CHARS: usize = 2000;

const MAX_SLUG_CHARS: usize = 80;

const SYSTEM: &str = "You write a short descriptive title (at most eight words) for a captured \
     document. Reply with the title only.";

pub struct SlugDigester;

#[async_trait]
impl Digester for SlugDigester {
    fn name(&self) -> &'static str {
        SLUG
    }

    fn label(&self) -> &'static str {
        "Slug"
    }

    async fn applies(&self, ctx: &DigestContext<'_>) -> Result<bool> {
        if ctx.deps.llm.is_none() {
            return Ok(false);
        }

        if text_source::summary_text(ctx.digests).is_some() {
            return Ok(true);
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

        let (text, source) = if let Some(summary) = text_source::summary_text(ctx.digests) {
            (summary, "summary".to_string())
        } else if let Some(resolved) =
            text_source::resolve(ctx.file, ctx.digests, &ctx.deps.config.data_root).await?
        {
            (resolved.text, resolved.kind.as_str().to_string())
        } else {
            return Ok(Vec::new());
        };

        let excerpt: String = text.chars().take(MAX_PROMPT_CHARS).collect();
        let title = llm.complete(SYSTEM, &excerpt).await?;
        let title = title.trim().trim_matches('"').to_string();

        let slug = slugify(&title);
        if slug.is_empty() {
            return Ok(Vec::new());
        }

        let content = serde_json::json!({
            "slug": slug,
            "title": title,
            "source": source,
        });
        Ok(vec![DigestOutput::completed(SLUG).with_content(content.to_string())])
    }
}

/// Lowercase, non-alphanumeric runs collapsed to single hyphens, bounded
/// length.
pub fn slugify(title: &str) -> String {
    static NON_ALNUM: OnceLock<regex::Regex> = OnceLock::new();
    let non_alnum = NON_ALNUM.get_or_init(|| {
        regex::Regex::new(r"[^a-z0-9]+").expect("slug pattern is valid")
    });

    let lowered = title.to_lowercase();
    let slug = non_alnum.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');

    slug.chars().take(MAX_SLUG_CHARS).collect::<String>()
        .trim_end_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_normalizes_titles() {
        assert_eq!(slugify("Captured Example Article"), "captured-example-article");
        assert_eq!(slugify("  Rust & Tokio: async I/O!  "), "rust-tokio-async-i-o");
        assert_eq!(slugify("___"), "");
        assert_eq!(slugify("Émigré café"), "migr-caf");
    }

    #[test]
    fn slugify_bounds_length() {
        let long = "word ".repeat(50);
        let slug = slugify(&long);
        assert!(slug.chars().count() <= 80);
        assert!(!slug.ends_with('-'));
    }
}
