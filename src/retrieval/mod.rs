//! Context retrieval
//!
//! Queries an external vector index for text fragments relevant to a
//! question vector and ranks them for prompt assembly. The vector store is
//! behind the [`VectorSearch`] trait; [`qdrant::QdrantSearch`] is the
//! production implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod qdrant;

/// A text fragment retrieved from the vector index.
///
/// Immutable once produced by retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextChunk {
    /// Opaque point identifier in the underlying store
    pub id: String,

    /// Origin label, typically a source file path
    pub source: String,

    /// Fragment content
    pub text: String,

    /// Similarity score in [0, 1]
    pub score: f32,
}

/// One raw hit from the vector store, before ranking.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub payload: HitPayload,
}

/// Payload stored alongside each vector.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HitPayload {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub text: String,
}

/// Errors from the vector-search collaborator.
///
/// "Collection not found" is deliberately distinct from an empty result set
/// and from backend failures; the orchestrator recovers from the former and
/// treats the latter as fatal.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Vector store backend error: {0}")]
    Backend(String),
}

/// Errors from the retriever.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The per-RAG index does not exist. Recoverable: the orchestrator
    /// answers with empty context.
    #[error("Index not found for RAG: {0}")]
    IndexNotFound(String),

    #[error(transparent)]
    Backend(SearchError),
}

/// Vector-search collaborator contract.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchHit>, SearchError>;
}

/// Retrieves and ranks context chunks for a RAG.
pub struct ContextRetriever {
    search: std::sync::Arc<dyn VectorSearch>,
}

impl ContextRetriever {
    pub fn new(search: std::sync::Arc<dyn VectorSearch>) -> Self {
        Self { search }
    }

    /// Deterministic index name for a RAG.
    pub fn collection_name(rag_id: &str) -> String {
        format!("{}_collection", rag_id)
    }

    /// Retrieve up to `top_k` chunks for the question vector, ordered by
    /// descending score.
    ///
    /// Sub-threshold hits are dropped before truncation to `top_k`, so a
    /// strict threshold can return fewer than `top_k` chunks even when the
    /// store holds more. Score ties keep the order returned by the store.
    pub async fn retrieve(
        &self,
        rag_id: &str,
        question_vector: &[f32],
        top_k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ContextChunk>, RetrievalError> {
        let collection = Self::collection_name(rag_id);

        // The store applies the threshold before its own limit when it
        // supports thresholds; the local filter below covers stores that
        // ignore it, so filtering always precedes truncation.
        let hits = self
            .search
            .search(&collection, question_vector, top_k.max(1), score_threshold)
            .await
            .map_err(|e| match e {
                SearchError::CollectionNotFound(_) => {
                    RetrievalError::IndexNotFound(rag_id.to_string())
                }
                other => RetrievalError::Backend(other),
            })?;

        let mut chunks: Vec<ContextChunk> = hits
            .into_iter()
            .filter(|hit| score_threshold.map_or(true, |threshold| hit.score >= threshold))
            .map(|hit| ContextChunk {
                id: hit.id,
                source: hit.payload.source,
                text: hit.payload.text,
                score: hit.score,
            })
            .collect();

        chunks.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        chunks.truncate(top_k);

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct FixedHits(Vec<SearchHit>);

    #[async_trait]
    impl VectorSearch for FixedHits {
        async fn search(
            &self,
            _collection: &str,
            _vector: &[f32],
            _limit: usize,
            _score_threshold: Option<f32>,
        ) -> Result<Vec<SearchHit>, SearchError> {
            Ok(self.0.clone())
        }
    }

    struct MissingCollection;

    #[async_trait]
    impl VectorSearch for MissingCollection {
        async fn search(
            &self,
            collection: &str,
            _vector: &[f32],
            _limit: usize,
            _score_threshold: Option<f32>,
        ) -> Result<Vec<SearchHit>, SearchError> {
            Err(SearchError::CollectionNotFound(collection.to_string()))
        }
    }

    fn hit(id: &str, score: f32) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            score,
            payload: HitPayload {
                source: format!("{}.txt", id),
                text: format!("text of {}", id),
            },
        }
    }

    #[test]
    fn test_collection_name_is_deterministic() {
        assert_eq!(ContextRetriever::collection_name("policies"), "policies_collection");
    }

    #[tokio::test]
    async fn test_threshold_applied_before_truncation() {
        let retriever = ContextRetriever::new(Arc::new(FixedHits(vec![
            hit("a", 0.9),
            hit("b", 0.7),
            hit("c", 0.4),
        ])));

        let chunks = retriever
            .retrieve("docs", &[0.1, 0.2], 2, Some(0.5))
            .await
            .unwrap();

        let scores: Vec<f32> = chunks.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![0.9, 0.7]);
    }

    #[tokio::test]
    async fn test_results_ordered_by_descending_score() {
        let retriever = ContextRetriever::new(Arc::new(FixedHits(vec![
            hit("low", 0.2),
            hit("high", 0.95),
            hit("mid", 0.6),
        ])));

        let chunks = retriever.retrieve("docs", &[0.0], 5, None).await.unwrap();
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);
    }

    #[tokio::test]
    async fn test_ties_keep_store_order() {
        let retriever = ContextRetriever::new(Arc::new(FixedHits(vec![
            hit("first", 0.5),
            hit("second", 0.5),
        ])));

        let chunks = retriever.retrieve("docs", &[0.0], 5, None).await.unwrap();
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_missing_collection_maps_to_index_not_found() {
        let retriever = ContextRetriever::new(Arc::new(MissingCollection));
        let err = retriever.retrieve("ghost", &[0.0], 5, None).await.unwrap_err();
        assert!(matches!(err, RetrievalError::IndexNotFound(ref rag) if rag == "ghost"));
    }
}
