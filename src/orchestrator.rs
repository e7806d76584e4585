//! Query orchestration pipeline
//!
//! Composes retrieval, prompt assembly, and the generation gateway into the
//! single "answer a question" operation callers invoke. A query moves through
//! retrieving, assembling, and generating, and ends succeeded, degraded, or
//! fatal. Provider-side generation failure never reaches the caller as an
//! error: it becomes a degraded [`Answer`] with a fixed text. Only
//! infrastructure failures (metrics wiring bugs, unreachable retrieval
//! backend, missing templates, embedding failures) propagate.
//!
//! The orchestrator holds no cross-request mutable state beyond the shared
//! [`MetricsRegistry`]; each call owns its `Answer` lifecycle end to end.

use crate::cache::{CachedAnswer, ResponseCache};
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::llm::gateway::{GatewayError, GenerationGateway};
use crate::llm::{CompletionError, Message};
use crate::metrics::{
    MetricsError, MetricsRegistry, MetricsSnapshot, CACHE_HITS_TOTAL, ERRORS_TOTAL,
    RATE_LIMITED_TOTAL, REQUESTS_TOTAL,
};
use crate::prompt::{PromptAssembler, TemplateError};
use crate::retrieval::{ContextChunk, ContextRetriever, RetrievalError, SearchError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of chunks retrieved when the query does not say.
pub const DEFAULT_TOP_K: usize = 5;

/// Text of a degraded answer, returned when every model in the chain failed.
pub const DEGRADED_ANSWER_TEXT: &str =
    "could not generate a response, please try again later";

/// One inbound question.
#[derive(Debug, Clone)]
pub struct Query {
    /// RAG whose index should be searched
    pub rag_id: String,

    /// The natural-language question
    pub question: String,

    /// Number of chunks to retrieve (default 5)
    pub top_k: Option<usize>,

    /// Minimum similarity score for a chunk to be used
    pub score_threshold: Option<f32>,

    /// Session identifier; generated when absent
    pub session_id: Option<String>,

    /// Prior conversation turns, oldest first
    pub history: Option<Vec<Message>>,
}

impl Query {
    pub fn new(rag_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            rag_id: rag_id.into(),
            question: question.into(),
            top_k: None,
            score_threshold: None,
            session_id: None,
            history: None,
        }
    }
}

/// The structured result of one query. Created once, never mutated after
/// construction.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Generated (or degraded) answer text
    pub text: String,

    /// Chunks that backed the answer, highest score first
    pub chunks_used: Vec<ContextChunk>,

    /// Wall-clock latency of the whole call
    pub latency_ms: u64,

    /// Session this answer belongs to
    pub session_id: String,

    /// True if any model other than the primary produced the text
    pub used_fallback: bool,

    /// Model that produced the text; `None` for degraded answers
    pub model_used: Option<String>,

    /// True if the answer came from the response cache
    pub cache_hit: bool,

    /// RAG that was queried
    pub rag_id: String,

    /// When the answer was produced
    pub timestamp: DateTime<Utc>,
}

/// Fatal failures surfaced to the caller.
///
/// Everything here indicates infrastructure or wiring problems, not
/// provider-side generation failure (which degrades instead).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Retrieval backend failed: {0}")]
    RetrievalBackend(SearchError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Query cancelled")]
    Cancelled,
}

/// Template paths resolved against the template store's base directory.
#[derive(Debug, Clone)]
pub struct TemplatePaths {
    pub system: PathBuf,
    pub user: PathBuf,
}

impl Default for TemplatePaths {
    fn default() -> Self {
        Self {
            system: PathBuf::from("prompts/system_default.txt"),
            user: PathBuf::from("prompts/user_default.txt"),
        }
    }
}

/// Generation parameters applied to every gateway call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

/// The component callers invoke directly.
pub struct QueryOrchestrator {
    metrics: Arc<MetricsRegistry>,
    retriever: ContextRetriever,
    assembler: PromptAssembler,
    gateway: GenerationGateway,
    embedder: Arc<dyn EmbeddingProvider>,
    cache: Option<Arc<dyn ResponseCache>>,
    templates: TemplatePaths,
    generation: GenerationParams,
}

impl QueryOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        metrics: Arc<MetricsRegistry>,
        retriever: ContextRetriever,
        assembler: PromptAssembler,
        gateway: GenerationGateway,
        embedder: Arc<dyn EmbeddingProvider>,
        cache: Option<Arc<dyn ResponseCache>>,
        templates: TemplatePaths,
        generation: GenerationParams,
    ) -> Self {
        Self {
            metrics,
            retriever,
            assembler,
            gateway,
            embedder,
            cache,
            templates,
            generation,
        }
    }

    /// Answer a question. See [`Self::answer_with_cancel`].
    pub async fn answer(&self, query: Query) -> Result<Answer, OrchestratorError> {
        self.answer_with_cancel(query, CancellationToken::new())
            .await
    }

    /// Answer a question, aborting in-flight generation if `cancel` fires.
    ///
    /// Latency is recorded on every path, including degraded and fatal ones.
    /// Degraded answers count toward `errors_total` but return `Ok`.
    pub async fn answer_with_cancel(
        &self,
        query: Query,
        cancel: CancellationToken,
    ) -> Result<Answer, OrchestratorError> {
        let started = Instant::now();
        self.metrics.increment_counter(REQUESTS_TOTAL)?;

        let result = self.run(query, &cancel).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        self.metrics.record_latency(latency_ms as f64);

        match result {
            Ok(answer) => Ok(Answer {
                latency_ms,
                ..answer
            }),
            Err(error) => {
                self.metrics.increment_counter(ERRORS_TOTAL)?;
                Err(error)
            }
        }
    }

    /// Read-only, side-effect-free view of the shared metrics.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn run(
        &self,
        query: Query,
        cancel: &CancellationToken,
    ) -> Result<Answer, OrchestratorError> {
        let session_id = query
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&query.rag_id, &query.question).await {
                debug!(rag_id = %query.rag_id, "response cache hit");
                self.metrics.increment_counter(CACHE_HITS_TOTAL)?;
                return Ok(self.answer_from_parts(
                    &query, session_id, hit.text, hit.chunks_used, hit.model_used,
                    hit.used_fallback, true,
                ));
            }
        }

        // Retrieving
        let question_vector = self.embedder.embed(&query.question).await?;
        let top_k = query.top_k.unwrap_or(DEFAULT_TOP_K);

        let chunks = match self
            .retriever
            .retrieve(&query.rag_id, &question_vector, top_k, query.score_threshold)
            .await
        {
            Ok(chunks) => chunks,
            Err(RetrievalError::IndexNotFound(rag_id)) => {
                // Not fatal: the model is told there is no context.
                warn!(%rag_id, "index not found, answering with empty context");
                Vec::new()
            }
            Err(RetrievalError::Backend(error)) => {
                return Err(OrchestratorError::RetrievalBackend(error));
            }
        };
        debug!(
            rag_id = %query.rag_id,
            chunks = chunks.len(),
            "context retrieved"
        );

        // Assembling
        let system_template = self.assembler.load_template(&self.templates.system).await?;
        let user_template = self.assembler.load_template(&self.templates.user).await?;
        let messages = PromptAssembler::build_messages(
            &system_template,
            &user_template,
            &query.question,
            &chunks,
            query.history.as_deref(),
        );

        // Generating
        match self
            .gateway
            .complete(
                &messages,
                self.generation.max_tokens,
                self.generation.temperature,
                cancel,
            )
            .await
        {
            Ok(outcome) => {
                info!(
                    rag_id = %query.rag_id,
                    model = %outcome.model_used,
                    used_fallback = outcome.used_fallback,
                    "answer generated"
                );

                if let Some(cache) = &self.cache {
                    cache
                        .put(
                            &query.rag_id,
                            &query.question,
                            CachedAnswer {
                                text: outcome.text.clone(),
                                chunks_used: chunks.clone(),
                                model_used: Some(outcome.model_used.clone()),
                                used_fallback: outcome.used_fallback,
                            },
                        )
                        .await;
                }

                Ok(self.answer_from_parts(
                    &query,
                    session_id,
                    outcome.text,
                    chunks,
                    Some(outcome.model_used),
                    outcome.used_fallback,
                    false,
                ))
            }
            Err(GatewayError::AllModelsExhausted { last }) => {
                // Degraded: the caller still gets a well-formed answer.
                warn!(rag_id = %query.rag_id, %last, "all models exhausted, returning degraded answer");
                if matches!(last, CompletionError::RateLimited) {
                    self.metrics.increment_counter(RATE_LIMITED_TOTAL)?;
                }
                self.metrics.increment_counter(ERRORS_TOTAL)?;
                Ok(self.answer_from_parts(
                    &query,
                    session_id,
                    DEGRADED_ANSWER_TEXT.to_string(),
                    chunks,
                    None,
                    false,
                    false,
                ))
            }
            Err(GatewayError::EmptyChain) => {
                warn!("generation gateway has no models configured");
                self.metrics.increment_counter(ERRORS_TOTAL)?;
                Ok(self.answer_from_parts(
                    &query,
                    session_id,
                    DEGRADED_ANSWER_TEXT.to_string(),
                    chunks,
                    None,
                    false,
                    false,
                ))
            }
            Err(GatewayError::Cancelled) => Err(OrchestratorError::Cancelled),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn answer_from_parts(
        &self,
        query: &Query,
        session_id: String,
        text: String,
        chunks_used: Vec<ContextChunk>,
        model_used: Option<String>,
        used_fallback: bool,
        cache_hit: bool,
    ) -> Answer {
        Answer {
            text,
            chunks_used,
            // Overwritten by the caller with the measured value.
            latency_ms: 0,
            session_id,
            used_fallback,
            model_used,
            cache_hit,
            rag_id: query.rag_id.clone(),
            timestamp: Utc::now(),
        }
    }
}
