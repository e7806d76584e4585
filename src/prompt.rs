//! Prompt template loading and message assembly
//!
//! Templates are plain text files with `{question}` and `{context}`
//! placeholders. Loaded templates are cached in memory keyed by path; the
//! cache is invalidated only by an explicit [`PromptAssembler::clear_cache`]
//! call; there is no file watching.

use crate::llm::Message;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::OnceCell;

/// Rendered in place of the context block when retrieval produced nothing,
/// so downstream prompts stay well-formed.
pub const NO_CONTEXT_FALLBACK: &str = "[no relevant context found]";

/// Errors from the template store.
#[derive(Debug, Clone, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(PathBuf),

    #[error("Template read failed for {0}: {1}")]
    Io(PathBuf, String),
}

/// Template store collaborator contract.
#[async_trait::async_trait]
pub trait TemplateStore: Send + Sync {
    async fn load(&self, path: &Path) -> Result<String, TemplateError>;
}

/// Reads templates from files under a base directory.
pub struct FsTemplateStore {
    base_dir: PathBuf,
}

impl FsTemplateStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait::async_trait]
impl TemplateStore for FsTemplateStore {
    async fn load(&self, path: &Path) -> Result<String, TemplateError> {
        let full_path = self.base_dir.join(path);
        match tokio::fs::read_to_string(&full_path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TemplateError::NotFound(full_path))
            }
            Err(e) => Err(TemplateError::Io(full_path, e.to_string())),
        }
    }
}

/// Loads, caches, and renders prompt templates.
pub struct PromptAssembler {
    store: Arc<dyn TemplateStore>,
    // Per-path once-cells give compute-once semantics for concurrent first
    // loads. The map lock is held only to fetch or insert a cell, never
    // across the store I/O. A failed load leaves its cell empty, so the next
    // call retries.
    cache: Mutex<HashMap<PathBuf, Arc<OnceCell<String>>>>,
}

impl PromptAssembler {
    pub fn new(store: Arc<dyn TemplateStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Load a template, from cache when previously loaded.
    pub async fn load_template(&self, path: &Path) -> Result<String, TemplateError> {
        let cell = {
            let mut cache = match self.cache.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(
                cache
                    .entry(path.to_path_buf())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        let content = cell
            .get_or_try_init(|| self.store.load(path))
            .await?;
        Ok(content.clone())
    }

    /// Drop all cached templates. The only invalidation mechanism.
    pub fn clear_cache(&self) {
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.clear();
    }

    /// Render retrieved chunks into the context block.
    ///
    /// Each chunk is emitted with its source, relevance score, and text.
    /// Empty input renders [`NO_CONTEXT_FALLBACK`], never an empty string.
    pub fn format_context(chunks: &[crate::retrieval::ContextChunk]) -> String {
        if chunks.is_empty() {
            return NO_CONTEXT_FALLBACK.to_string();
        }

        chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                format!(
                    "[Source {}: {} (relevance: {:.2})]\n{}",
                    i + 1,
                    chunk.source,
                    chunk.score,
                    chunk.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }

    /// Build the role-tagged message sequence for the generation call.
    ///
    /// Order: system message, prior `history` turns in chronological order,
    /// then the current user turn. `{question}` and `{context}` placeholders
    /// are substituted in both templates.
    pub fn build_messages(
        system_template: &str,
        user_template: &str,
        question: &str,
        chunks: &[crate::retrieval::ContextChunk],
        history: Option<&[Message]>,
    ) -> Vec<Message> {
        let context = Self::format_context(chunks);

        let substitute = |template: &str| {
            template
                .replace("{question}", question)
                .replace("{context}", &context)
        };

        let mut messages = Vec::with_capacity(2 + history.map_or(0, <[Message]>::len));
        messages.push(Message::system(substitute(system_template)));

        if let Some(turns) = history {
            messages.extend(turns.iter().cloned());
        }

        messages.push(Message::user(substitute(user_template)));
        messages
    }
}
