//! Crawl gateway client: URL → markdown + screenshot.

use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use std::time::Duration;

/// Result of crawling one URL.
#[derive(Debug, Clone)]
pub struct CrawlResult {
    pub url: String,
    pub markdown: String,
    pub title: Option<String>,
    /// PNG screenshot of the rendered page, when the gateway produced one.
    pub screenshot: Option<Vec<u8>>,
}

#[async_trait]
pub trait CrawlGateway: Send + Sync {
    async fn crawl(&self, url: &str) -> Result<CrawlResult>;
}

/// reqwest client for the crawl service.
#[derive(Debug, Clone)]
pub struct HttpCrawlGateway {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CrawlResponse {
    markdown: String,
    title: Option<String>,
    screenshot_base64: Option<String>,
}

impl HttpCrawlGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into(),
            client: super::http_client(timeout)?,
        })
    }
}

#[async_trait]
impl CrawlGateway for HttpCrawlGateway {
    async fn crawl(&self, url: &str) -> Result<CrawlResult> {
        let response = self
            .client
            .post(format!("{}/crawl", self.base_url))
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .map_err(|error| GatewayError::Request(error.to_string()))?;

        let response = super::check_status(response).await?;
        let payload: CrawlResponse = response
            .json()
            .await
            .map_err(|error| GatewayError::MalformedResponse(error.to_string()))?;

        let screenshot = payload
            .screenshot_base64
            .as_deref()
            .map(|data| {
                base64::engine::general_purpose::STANDARD
                    .decode(data)
                    .map_err(|error| GatewayError::MalformedResponse(error.to_string()))
            })
            .transpose()?;

        Ok(CrawlResult {
            url: url.to_string(),
            markdown: payload.markdown,
            title: payload.title,
            screenshot,
        })
    }
}
