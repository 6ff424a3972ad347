//! URL crawler: a text file holding a bare URL becomes crawled markdown plus
//! a page screenshot.

use crate::blob;
use crate::digest::digester::{DigestContext, DigestOutput, Digester, OutputSpec};
use crate::digest::text_source;
use crate::error::Result;
use async_trait::async_trait;

pub const URL_CRAWL_CONTENT: &str = text_source::URL_CRAWL_CONTENT;
pub const URL_CRAWL_SCREENSHOT: &str = "url-crawl-screenshot";

/// A capture file bigger than this is not "a note holding one URL".
const MAX_URL_FILE_BYTES: i64 = 2048;

pub struct UrlCrawlDigester;

impl UrlCrawlDigester {
    /// The captured URL, if the file is exactly one http(s) URL.
    async fn captured_url(ctx: &DigestContext<'_>) -> Result<Option<String>> {
        let bytes = ctx.read_file().await?;
        let text = String::from_utf8_lossy(&bytes);
        let trimmed = text.trim();

        let is_url = (trimmed.starts_with("http://") || trimmed.starts_with("https://"))
            && !trimmed.contains(char::is_whitespace);

        Ok(is_url.then(|| trimmed.to_string()))
    }
}

#[async_trait]
impl Digester for UrlCrawlDigester {
    fn name(&self) -> &'static str {
        "url-crawl"
    }

    fn label(&self) -> &'static str {
        "URL crawler"
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        vec![
            OutputSpec::content(URL_CRAWL_CONTENT),
            OutputSpec::screenshot(URL_CRAWL_SCREENSHOT),
        ]
    }

    async fn applies(&self, ctx: &DigestContext<'_>) -> Result<bool> {
        if ctx.deps.crawl.is_none() {
            return Ok(false);
        }
        if ctx.file.is_folder
            || ctx.file.size == 0
            || ctx.file.size > MAX_URL_FILE_BYTES
            || !text_source::is_text_like(ctx.file)
        {
            return Ok(false);
        }

        // The size cap keeps this read cheap.
        Ok(Self::captured_url(ctx).await?.is_some())
    }

    async fn run(&self, ctx: &DigestContext<'_>) -> Result<Vec<DigestOutput>> {
        let Some(crawl) = ctx.deps.crawl.as_ref() else {
            return Ok(Vec::new());
        };
        let Some(url) = Self::captured_url(ctx).await? else {
            return Ok(Vec::new());
        };

        let result = crawl.crawl(&url).await?;
        tracing::info!(path = %ctx.file.path, url = %url, "crawled captured URL");

        let content = serde_json::json!({
            "url": result.url,
            "markdown": result.markdown,
            "title": result.title,
        });

        let mut outputs = vec![
            DigestOutput::completed(URL_CRAWL_CONTENT).with_content(content.to_string()),
        ];

        if let Some(screenshot) = result.screenshot {
            let key = blob::blob_key(&ctx.file.path, URL_CRAWL_SCREENSHOT, "screenshot.png");
            ctx.deps.blobs.put(&key, screenshot).await?;
            outputs.push(DigestOutput::completed(URL_CRAWL_SCREENSHOT).with_blob_key(key));
        }

        Ok(outputs)
    }
}
