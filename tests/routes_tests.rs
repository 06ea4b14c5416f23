//! Tests for the download passthrough and the fixed routes.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::TestServer;
use tower::ServiceExt;

async fn get(server: &TestServer, uri: &str, range: Option<&str>) -> axum::response::Response {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(range) = range {
        builder = builder.header(header::RANGE, range);
    }
    server
        .router
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_download_passthrough() {
    let server = TestServer::new().await;

    let response = get(&server, "/catbox/abc.png", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "catbox/abc.png full");
}

#[tokio::test]
async fn test_download_forwards_range() {
    let server = TestServer::new().await;

    let response = get(&server, "/litterbox/xyz.bin", Some("bytes=0-3")).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers().get(header::CONTENT_RANGE).unwrap(),
        "bytes 0-3/10"
    );
    assert_eq!(body_text(response).await, "litterbox/xyz.bin bytes=0-3");
}

#[tokio::test]
async fn test_download_missing_path() {
    let server = TestServer::new().await;

    let response = get(&server, "/pomf/", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_download_unreachable_backend() {
    let server = TestServer::with_config(|config, _| {
        config.backends.pomf.download_url = "http://127.0.0.1:9/".to_string();
    })
    .await;

    let response = get(&server, "/pomf/gone.txt", None).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_index_and_health() {
    let server = TestServer::new().await;

    let response = get(&server, "/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "fatbox is working.\n");

    let response = get(&server, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "healthy");

    let response = get(&server, "/favicon.ico", None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_unknown_route() {
    let server = TestServer::new().await;

    let response = get(&server, "/nope", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["message"], "Route GET:/nope not found");
    assert_eq!(body["statusCode"], 404);
}
