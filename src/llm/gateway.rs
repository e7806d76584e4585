//! Generation gateway
//!
//! Drives an ordered fallback chain of models over a [`ChatCompletion`]
//! provider. The chain is plain data ([`ModelSpec`] entries sorted by
//! priority), so the fallback policy is configurable and testable without
//! touching the call logic.
//!
//! The gateway does no metrics bookkeeping. Success and error accounting is
//! the orchestrator's responsibility, which keeps the gateway reusable in
//! isolation.

use super::{ChatCompletion, CompletionError, Message};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One entry in the fallback chain.
///
/// Lower priority is tried first. `retry_count` is the total number of
/// attempts allowed for this model; `timeout` bounds each single attempt.
/// Fallback models typically carry a longer timeout than the primary, since
/// they are reached rarely and can afford more patience.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelSpec {
    /// Provider-qualified model name, e.g. "openai/gpt-4o-mini"
    pub name: String,

    /// Per-attempt timeout
    pub timeout: Duration,

    /// Total attempts allowed for this model (minimum 1)
    pub retry_count: u32,

    /// Chain position; lower is tried first
    pub priority: u32,
}

/// Successful gateway result
#[derive(Debug, Clone)]
pub struct GatewayOutcome {
    /// Generated text
    pub text: String,

    /// Name of the model that produced the text
    pub model_used: String,

    /// True if the text came from any model other than the first in the chain
    pub used_fallback: bool,
}

/// Errors raised by the gateway
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("All models exhausted, last error: {last}")]
    AllModelsExhausted { last: CompletionError },

    #[error("Generation cancelled")]
    Cancelled,

    #[error("No models configured")]
    EmptyChain,
}

/// Multi-model invocation gateway with per-model retry and fallback.
pub struct GenerationGateway {
    chain: Vec<ModelSpec>,
    provider: Arc<dyn ChatCompletion>,
    backoff_base: Duration,
}

impl GenerationGateway {
    /// Create a gateway over the given chain.
    ///
    /// The chain is sorted ascending by priority at construction and is
    /// immutable afterwards.
    pub fn new(
        mut chain: Vec<ModelSpec>,
        provider: Arc<dyn ChatCompletion>,
        backoff_base: Duration,
    ) -> Self {
        chain.sort_by_key(|spec| spec.priority);
        Self {
            chain,
            provider,
            backoff_base,
        }
    }

    /// The configured chain, in attempt order.
    pub fn chain(&self) -> &[ModelSpec] {
        &self.chain
    }

    /// Invoke the chain until one model succeeds.
    ///
    /// For each model, up to `retry_count` attempts are made. Retryable
    /// failures wait `backoff_base * 2^attempt` before the next attempt;
    /// non-retryable failures abandon the model immediately. A success
    /// short-circuits the whole chain. Cancellation is checked between
    /// attempts and during backoff waits.
    pub async fn complete(
        &self,
        messages: &[Message],
        max_tokens: u32,
        temperature: f32,
        cancel: &CancellationToken,
    ) -> Result<GatewayOutcome, GatewayError> {
        if self.chain.is_empty() {
            return Err(GatewayError::EmptyChain);
        }

        let mut last_error = None;

        for (chain_index, spec) in self.chain.iter().enumerate() {
            let attempts = spec.retry_count.max(1);

            for attempt in 0..attempts {
                if cancel.is_cancelled() {
                    return Err(GatewayError::Cancelled);
                }

                debug!(
                    model = %spec.name,
                    attempt = attempt + 1,
                    attempts,
                    timeout_ms = spec.timeout.as_millis() as u64,
                    "attempting completion"
                );

                let result = tokio::time::timeout(
                    spec.timeout,
                    self.provider
                        .complete(&spec.name, messages, max_tokens, temperature, spec.timeout),
                )
                .await
                .unwrap_or(Err(CompletionError::Timeout));

                match result {
                    Ok(completion) => {
                        info!(model = %spec.name, used_fallback = chain_index > 0, "completion succeeded");
                        return Ok(GatewayOutcome {
                            text: completion.content,
                            model_used: spec.name.clone(),
                            used_fallback: chain_index > 0,
                        });
                    }
                    Err(error) if !error.is_retryable() => {
                        // Auth-class failure: remaining retries for this
                        // model cannot succeed, move on without delay.
                        warn!(model = %spec.name, %error, "non-retryable failure, advancing to next model");
                        last_error = Some(error);
                        break;
                    }
                    Err(error) => {
                        warn!(
                            model = %spec.name,
                            attempt = attempt + 1,
                            %error,
                            "retryable failure"
                        );
                        let is_last_attempt = attempt + 1 == attempts;
                        last_error = Some(error);

                        if !is_last_attempt {
                            let wait = self.backoff_base * 2u32.saturating_pow(attempt);
                            tokio::select! {
                                _ = tokio::time::sleep(wait) => {}
                                _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                            }
                        }
                    }
                }
            }
        }

        let last = last_error.unwrap_or(CompletionError::Network(
            "no attempt was made".to_string(),
        ));
        warn!(%last, "all models exhausted");
        Err(GatewayError::AllModelsExhausted { last })
    }
}
