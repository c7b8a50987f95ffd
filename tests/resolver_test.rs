//! HTTP resolver against an in-process dataset service

use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::path::PathBuf;
use std::time::Duration;
use volthumb::resolver::AUTH_TOKEN_HEADER;
use volthumb::{DatasetId, DatasetResolver, HttpDatasetResolver, ThumbError};

async fn dataset_record(
    Path((owner, dataset)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let token = headers
        .get(AUTH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    match (dataset.as_str(), token) {
        ("plain", _) => (StatusCode::UNAUTHORIZED, "go away").into_response(),
        ("garbled", "good") => (StatusCode::OK, "not json").into_response(),
        (_, "good") => Json(serde_json::json!({
            "path": format!("/data/{}/{}", owner, dataset),
            "name": dataset,
        }))
        .into_response(),
        _ => (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "message": "forbidden" })),
        )
            .into_response(),
    }
}

async fn spawn_upstream() -> HttpDatasetResolver {
    let app = Router::new().route("/api/datasets/{owner}/{dataset}", get(dataset_record));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    HttpDatasetResolver::new(format!("http://{}/api", addr), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_resolves_with_token() {
    let resolver = spawn_upstream().await;
    let dataset = DatasetId::new("alice", "scan").unwrap();

    let resolved = resolver.resolve(&dataset, Some("good")).await.unwrap();
    assert_eq!(resolved.path, PathBuf::from("/data/alice/scan"));
    assert_eq!(
        resolved.slice_directory(),
        PathBuf::from("/data/alice/scan/slices")
    );
}

#[tokio::test]
async fn test_refusal_carries_status_and_message() {
    let resolver = spawn_upstream().await;
    let dataset = DatasetId::new("alice", "scan").unwrap();

    for token in [Some("bad"), None] {
        match resolver.resolve(&dataset, token).await.unwrap_err() {
            ThumbError::Authorization { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message.as_deref(), Some("forbidden"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_refusal_without_json_body() {
    let resolver = spawn_upstream().await;
    let dataset = DatasetId::new("alice", "plain").unwrap();

    match resolver.resolve(&dataset, Some("good")).await.unwrap_err() {
        ThumbError::Authorization { status, message } => {
            assert_eq!(status, 401);
            assert!(message.is_none());
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_record() {
    let resolver = spawn_upstream().await;
    let dataset = DatasetId::new("alice", "garbled").unwrap();
    let err = resolver.resolve(&dataset, Some("good")).await.unwrap_err();
    assert!(matches!(err, ThumbError::InvalidFormat(_)));
}

#[tokio::test]
async fn test_unreachable_service() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let resolver =
        HttpDatasetResolver::new(format!("http://{}", addr), Duration::from_secs(2)).unwrap();
    let dataset = DatasetId::new("alice", "scan").unwrap();
    let err = resolver.resolve(&dataset, Some("good")).await.unwrap_err();
    assert!(matches!(err, ThumbError::Network(_) | ThumbError::Timeout(_)));
}
