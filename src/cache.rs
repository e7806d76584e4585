//! Response cache
//!
//! Optional collaborator that short-circuits generation for repeated
//! questions. Identical concurrent queries are not deduplicated: both may
//! reach the provider, and the later completion overwrites the entry.

use crate::retrieval::ContextChunk;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A cached generation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAnswer {
    pub text: String,
    pub chunks_used: Vec<ContextChunk>,
    pub model_used: Option<String>,
    pub used_fallback: bool,
}

/// Response cache collaborator contract.
///
/// Keyed by (rag_id, question). Lookups and stores are best-effort; a cache
/// failure must never fail the query.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, rag_id: &str, question: &str) -> Option<CachedAnswer>;
    async fn put(&self, rag_id: &str, question: &str, answer: CachedAnswer);
}

struct Entry {
    stored_at: Instant,
    answer: CachedAnswer,
}

/// In-memory TTL cache.
pub struct MemoryResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<(String, String), Entry>>,
}

impl MemoryResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ResponseCache for MemoryResponseCache {
    async fn get(&self, rag_id: &str, question: &str) -> Option<CachedAnswer> {
        let key = (rag_id.to_string(), question.to_string());
        let mut entries = self.lock_entries();

        match entries.get(&key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.answer.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    async fn put(&self, rag_id: &str, question: &str, answer: CachedAnswer) {
        let key = (rag_id.to_string(), question.to_string());
        let mut entries = self.lock_entries();
        entries.insert(
            key,
            Entry {
                stored_at: Instant::now(),
                answer,
            },
        );
    }
}
