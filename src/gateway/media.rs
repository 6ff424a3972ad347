//! Media gateway client: office conversion, page previews, OCR, ASR.

use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A speech-recognition result with optional speaker diarization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub transcript: String,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub speaker: Option<String>,
    pub text: String,
    pub start_secs: f64,
    pub end_secs: f64,
}

#[async_trait]
pub trait MediaGateway: Send + Sync {
    /// Convert a PDF/office/EPUB document to markdown.
    async fn document_to_markdown(&self, filename: &str, bytes: &[u8]) -> Result<String>;

    /// Render a PNG preview of the document's first page.
    async fn document_preview(&self, filename: &str, bytes: &[u8]) -> Result<Vec<u8>>;

    /// Extract text from an image.
    async fn image_ocr(&self, filename: &str, bytes: &[u8]) -> Result<String>;

    /// Transcribe audio.
    async fn transcribe(&self, filename: &str, bytes: &[u8]) -> Result<Transcript>;
}

/// reqwest client for the media service.
#[derive(Debug, Clone)]
pub struct HttpMediaGateway {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TextResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct BinaryResponse {
    data_base64: String,
}

impl HttpMediaGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into(),
            client: super::http_client(timeout)?,
        })
    }

    async fn post(&self, endpoint: &str, filename: &str, bytes: &[u8]) -> Result<reqwest::Response> {
        let body = serde_json::json!({
            "filename": filename,
            "data_base64": base64::engine::general_purpose::STANDARD.encode(bytes),
        });

        let response = self
            .client
            .post(format!("{}/{endpoint}", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|error| GatewayError::Request(error.to_string()))?;

        super::check_status(response).await
    }
}

#[async_trait]
impl MediaGateway for HttpMediaGateway {
    async fn document_to_markdown(&self, filename: &str, bytes: &[u8]) -> Result<String> {
        let payload: TextResponse = self
            .post("markdown", filename, bytes)
            .await?
            .json()
            .await
            .map_err(|error| GatewayError::MalformedResponse(error.to_string()))?;
        Ok(payload.text)
    }

    async fn document_preview(&self, filename: &str, bytes: &[u8]) -> Result<Vec<u8>> {
        let payload: BinaryResponse = self
            .post("preview", filename, bytes)
            .await?
            .json()
            .await
            .map_err(|error| GatewayError::MalformedResponse(error.to_string()))?;

        base64::engine::general_purpose::STANDARD
            .decode(&payload.data_base64)
            .map_err(|error| GatewayError::MalformedResponse(error.to_string()).into())
    }

    async fn image_ocr(&self, filename: &str, bytes: &[u8]) -> Result<String> {
        let payload: TextResponse = self
            .post("ocr", filename, bytes)
            .await?
            .json()
            .await
            .map_err(|error| GatewayError::MalformedResponse(error.to_string()))?;
        Ok(payload.text)
    }

    async fn transcribe(&self, filename: &str, bytes: &[u8]) -> Result<Transcript> {
        self.post("transcribe", filename, bytes)
            .await?
            .json()
            .await
            .map_err(|error| GatewayError::MalformedResponse(error.to_string()).into())
    }
}
