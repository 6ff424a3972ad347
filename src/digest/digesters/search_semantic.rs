//! Vector-index hand-off: chunk the text and enqueue the document for the
//! external vector store.

use crate::digest::digester::{DigestContext, DigestOutput, Digester};
use crate::digest::reindex::needs_reindex;
use crate::digest::text_source::{self, TextSourceOptions};
use crate::error::Result;
use async_trait::async_trait;

pub const SEARCH_SEMANTIC: &str = "search-semantic";

/// Embedding chunk size in characters.
pub const CHUNK_CHARS: usize = 2000;

pub struct SearchSemanticDigester;

#[async_trait]
impl Digester for SearchSemanticDigester {
    fn name(&self) -> &'static str {
        SEARCH_SEMANTIC
    }

    fn label(&self) -> &'static str {
        "Semantic search indexing"
    }

    async fn applies(&self, ctx: &DigestContext<'_>) -> Result<bool> {
        let has_text = text_source::has_any_text_source(
            ctx.file,
            ctx.digests,
            TextSourceOptions::default(),
        );

        Ok(has_text && needs_reindex(ctx.file, ctx.digests, SEARCH_SEMANTIC))
    }

    async fn run(&self, ctx: &DigestContext<'_>) -> Result<Vec<DigestOutput>> {
        let Some(source) =
            text_source::resolve(ctx.file, ctx.digests, &ctx.deps.config.data_root).await?
        else {
            return Ok(Vec::new());
        };

        let chunks = chunk_text(&source.text, CHUNK_CHARS);

        let Some(task_id) = ctx
            .deps
            .index_queue
            .enqueue_semantic(&[ctx.file.path.clone()])
            .await?
        else {
            return Ok(Vec::new());
        };

        tracing::debug!(
            path = %ctx.file.path,
            task_id = %task_id,
            chunks = chunks.len(),
            "semantic indexing enqueued"
        );

        let content = serde_json::json!({
            "task_id": task_id,
            "chunks": chunks.len(),
            "chunk_chars": CHUNK_CHARS,
        });
        Ok(vec![
            DigestOutput::completed(SEARCH_SEMANTIC).with_content(content.to_string()),
        ])
    }
}

/// Split text into embedding-sized chunks, preferring paragraph boundaries
/// and falling back to hard splits for unbroken runs.
pub fn chunk_text(text: &str, chunk_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if !current.is_empty() && current.chars().count() + paragraph.chars().count() > chunk_chars
        {
            chunks.push(std::mem::take(&mut current));
        }

        if paragraph.chars().count() > chunk_chars {
            // A single oversized paragraph is split hard.
            let mut buffer = String::new();
            let mut buffered = 0usize;
            for ch in paragraph.chars() {
                buffer.push(ch);
                buffered += 1;
                if buffered >= chunk_chars {
                    chunks.push(std::mem::take(&mut buffer));
                    buffered = 0;
                }
            }
            if !buffer.is_empty() {
                current = buffer;
            }
            continue;
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = chunk_text("one paragraph only", 100);
        assert_eq!(chunks, vec!["one paragraph only"]);
    }

    #[test]
    fn paragraphs_are_packed_up_to_the_limit() {
        let text = "aaaa\n\nbbbb\n\ncccc";
        let chunks = chunk_text(text, 10);

        assert_eq!(chunks, vec!["aaaa\n\nbbbb", "cccc"]);
    }

    #[test]
    fn oversized_paragraphs_are_split_hard() {
        let text = "x".repeat(4500);
        let chunks = chunk_text(&text, 2000);

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 2000));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 100).is_empty());
        assert!(chunk_text("\n\n\n\n", 100).is_empty());
    }
}
