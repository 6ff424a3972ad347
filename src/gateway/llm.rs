//! LLM gateway client for the AI digesters (summary, tags, slug).

use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// One-shot completion. The caller owns prompt construction and any
    /// parsing of structured output.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// reqwest client for the LLM proxy service.
#[derive(Debug, Clone)]
pub struct HttpLlmGateway {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    text: String,
}

impl HttpLlmGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into(),
            client: super::http_client(timeout)?,
        })
    }
}

#[async_trait]
impl LlmGateway for HttpLlmGateway {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/complete", self.base_url))
            .json(&serde_json::json!({ "system": system, "prompt": prompt }))
            .send()
            .await
            .map_err(|error| GatewayError::Request(error.to_string()))?;

        let response = super::check_status(response).await?;
        let payload: CompletionResponse = response
            .json()
            .await
            .map_err(|error| GatewayError::MalformedResponse(error.to_string()))?;

        Ok(payload.text)
    }
}
