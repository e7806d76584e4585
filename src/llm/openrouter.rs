//! OpenRouter chat-completion client
//!
//! Speaks the OpenAI-compatible `/chat/completions` endpoint exposed by
//! OpenRouter. The API key is read from an environment variable named in the
//! configuration; it is resolved per call so a key rotated at runtime is
//! picked up without a restart.

use super::{ChatCompletion, Completion, CompletionError, Message};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Client for the OpenRouter chat-completions API.
pub struct OpenRouterClient {
    base_url: String,
    api_key_env: String,
    referer: String,
    client: reqwest::Client,
}

impl OpenRouterClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key_env: impl Into<String>,
        referer: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key_env: api_key_env.into(),
            referer: referer.into(),
            client: reqwest::Client::new(),
        }
    }

    fn api_key(&self) -> Result<String, CompletionError> {
        std::env::var(&self.api_key_env)
            .map_err(|_| CompletionError::MissingApiKey(self.api_key_env.clone()))
    }
}

#[async_trait]
impl ChatCompletion for OpenRouterClient {
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        max_tokens: u32,
        temperature: f32,
        timeout: Duration,
    ) -> super::Result<Completion> {
        let api_key = self.api_key()?;
        let url = format!("{}/chat/completions", self.base_url);

        let api_messages: Vec<_> = messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content,
                })
            })
            .collect();

        let payload = json!({
            "model": model,
            "messages": api_messages,
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", &self.referer)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout
                } else {
                    CompletionError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = extract_error_message(&text).unwrap_or(text);

            return Err(match status.as_u16() {
                401 | 403 => CompletionError::Auth(detail),
                429 => CompletionError::RateLimited,
                500..=599 => CompletionError::Server(format!("{}: {}", status, detail)),
                // Other 4xx responses mean the request itself is bad; a
                // retry against the same model cannot fix it.
                _ => CompletionError::Parse(format!("{}: {}", status, detail)),
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CompletionError::Parse(e.to_string()))?;

        let content = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| CompletionError::Parse("No content in response".to_string()))?;

        let served_model = data
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(model)
            .to_string();

        Ok(Completion {
            content: content.to_string(),
            model: served_model,
        })
    }
}

/// Pull the human-readable message out of an OpenRouter error body, if any.
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}
