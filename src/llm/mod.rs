//! LLM Provider Abstraction Layer
//!
//! This module provides a common interface for invoking chat-completion
//! providers. The [`ChatCompletion`] trait defines the contract a provider
//! must implement; [`gateway::GenerationGateway`] drives an ordered fallback
//! chain of models over any such provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod gateway;
pub mod openrouter;

/// Result type for provider calls
pub type Result<T> = std::result::Result<T, CompletionError>;

/// Errors that can occur when invoking a chat-completion provider.
///
/// The kind classification drives the gateway's retryable / non-retryable
/// branching, so providers must map transport and status failures onto the
/// right variant.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompletionError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Request timed out")]
    Timeout,

    #[error("Server error: {0}")]
    Server(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("API key not set: {0}")]
    MissingApiKey(String),
}

impl CompletionError {
    /// Whether a retry against the same model can plausibly succeed.
    ///
    /// Auth failures and malformed responses will not improve with retries;
    /// timeouts, rate limits, server errors, and transport failures may.
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::Auth(_)
            | CompletionError::Parse(_)
            | CompletionError::MissingApiKey(_) => false,
            CompletionError::RateLimited
            | CompletionError::Timeout
            | CompletionError::Server(_)
            | CompletionError::Network(_) => true,
        }
    }
}

/// Message in a conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender (system, user, assistant)
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message
    System,

    /// User message
    User,

    /// Assistant message
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Successful completion returned by a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text
    pub content: String,

    /// Model that actually served the request, as reported by the provider
    pub model: String,
}

/// Chat-completion provider contract.
///
/// One provider serves every model in the fallback chain; the gateway passes
/// the model name per call. `timeout` bounds the single HTTP attempt.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        max_tokens: u32,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Completion>;
}
