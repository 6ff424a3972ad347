//! HTTP clients for the external enrichment services.
//!
//! Each service sits behind a narrow trait so the pipeline can be exercised
//! with stubs; the shipped implementations are thin reqwest JSON clients.

pub mod crawl;
pub mod llm;
pub mod media;

pub use crawl::{CrawlGateway, CrawlResult, HttpCrawlGateway};
pub use llm::{HttpLlmGateway, LlmGateway};
pub use media::{HttpMediaGateway, MediaGateway, Transcript, TranscriptSegment};

use crate::error::{GatewayError, Result};
use std::time::Duration;

/// Shared reqwest client construction with the configured request timeout.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|error| GatewayError::Request(error.to_string()).into())
}

/// Surface non-2xx responses as gateway errors with the body attached.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let body = body.chars().take(512).collect::<String>();
    Err(GatewayError::Status {
        status: status.as_u16(),
        body,
    }
    .into())
}
