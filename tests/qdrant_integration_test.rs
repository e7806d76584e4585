//! Integration tests for the Qdrant search client
//!
//! Validates response parsing and the collection-not-found signal using
//! wiremock servers.

use ragline::retrieval::qdrant::QdrantSearch;
use ragline::retrieval::{ContextRetriever, RetrievalError, SearchError, VectorSearch};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn search_client(server: &MockServer) -> QdrantSearch {
    QdrantSearch::new(server.uri(), None, Duration::from_secs(5))
}

#[tokio::test]
async fn test_search_parses_hits() {
    let server = MockServer::start().await;

    let body = json!({
        "status": "ok",
        "result": [
            {"id": "p1", "score": 0.91, "payload": {"source": "policy.pdf", "text": "first"}},
            {"id": 7, "score": 0.42, "payload": {"source_path": "old.txt", "text": "second"}}
        ]
    });

    Mock::given(method("POST"))
        .and(path("/collections/docs_collection/points/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let hits = search_client(&server)
        .search("docs_collection", &[0.1, 0.2, 0.3], 5, None)
        .await
        .unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "p1");
    assert_eq!(hits[0].payload.source, "policy.pdf");
    assert_eq!(hits[1].id, "7");
    assert_eq!(hits[1].payload.source, "old.txt");
}

#[tokio::test]
async fn test_missing_collection_is_distinct_from_empty() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/collections/ghost_collection/points/search"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "status": {"error": "Not found: Collection `ghost_collection` doesn't exist!"}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/collections/empty_collection/points/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": []})))
        .mount(&server)
        .await;

    let client = search_client(&server);

    let err = client
        .search("ghost_collection", &[0.1], 5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::CollectionNotFound(_)));

    let hits = client
        .search("empty_collection", &[0.1], 5, None)
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_backend_failure_is_a_backend_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/collections/docs_collection/points/search"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = search_client(&server)
        .search("docs_collection", &[0.1], 5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::Backend(_)));
}

#[tokio::test]
async fn test_retriever_maps_collection_name_and_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/collections/policies_collection/points/search"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let retriever = ContextRetriever::new(
        Arc::new(search_client(&server)) as Arc<dyn VectorSearch>
    );

    let err = retriever
        .retrieve("policies", &[0.1, 0.2], 5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RetrievalError::IndexNotFound(ref rag) if rag == "policies"));
}
