//! Embedding provider abstraction
//!
//! The orchestrator treats embedding strictly as an opaque collaborator:
//! text in, vector out. [`HttpEmbeddingProvider`] targets the embedding
//! sidecar service; tests plug in fixed-vector fakes.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors from the embedding collaborator.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding service error: {0}")]
    Service(String),

    #[error("Embedding request timed out")]
    Timeout,
}

/// Embedding collaborator contract.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// HTTP client for the embedding sidecar service.
pub struct HttpEmbeddingProvider {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpEmbeddingProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/embed", self.base_url);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout
                } else {
                    EmbeddingError::Service(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Service(format!("{}: {}", status, text)));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Service(e.to_string()))?;

        Ok(body.embedding)
    }
}
