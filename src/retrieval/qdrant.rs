//! Qdrant vector-search client
//!
//! Talks to the Qdrant REST API (`POST /collections/{name}/points/search`).
//! A missing collection (404) is reported as
//! [`SearchError::CollectionNotFound`], which the retriever distinguishes
//! from an empty result set.

use super::{HitPayload, SearchError, SearchHit, VectorSearch};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Qdrant REST search implementation.
pub struct QdrantSearch {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl QdrantSearch {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            timeout,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl VectorSearch for QdrantSearch {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let url = format!("{}/collections/{}/points/search", self.base_url, collection);

        let mut payload = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(threshold) = score_threshold {
            payload["score_threshold"] = json!(threshold);
        }

        let mut request = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("Content-Type", "application/json")
            .json(&payload);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(SearchError::CollectionNotFound(collection.to_string()));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::Backend(format!("{}: {}", status, text)));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;

        let hits = data
            .get("result")
            .and_then(|r| r.as_array())
            .ok_or_else(|| SearchError::Backend("No result array in response".to_string()))?;

        Ok(hits.iter().map(parse_hit).collect())
    }
}

/// Lift one Qdrant scored point into a [`SearchHit`].
///
/// Point ids may be integers or UUID strings; older ingest runs stored the
/// origin under `source_path` instead of `source`.
fn parse_hit(hit: &serde_json::Value) -> SearchHit {
    let id = match hit.get("id") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => "unknown".to_string(),
    };

    let score = hit
        .get("score")
        .and_then(|s| s.as_f64())
        .unwrap_or(0.0) as f32;

    let payload = hit.get("payload");
    let source = payload
        .and_then(|p| p.get("source").or_else(|| p.get("source_path")))
        .and_then(|s| s.as_str())
        .unwrap_or("unknown")
        .to_string();
    let text = payload
        .and_then(|p| p.get("text"))
        .and_then(|t| t.as_str())
        .unwrap_or("")
        .to_string();

    SearchHit {
        id,
        score,
        payload: HitPayload { source, text },
    }
}
