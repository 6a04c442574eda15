#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use quizstage_api::{
    cache::memory::InMemoryCache, config::Config, create_router, services::AppState,
    store::memory::InMemoryStore,
};

pub fn test_config() -> Config {
    Config {
        mongo_uri: "mongodb://localhost:27017".to_string(),
        redis_uri: "redis://127.0.0.1:6379/0".to_string(),
        mongo_database: "quizstage_test".to_string(),
    }
}

/// Builds the full router over in-memory store and cache fakes, so the
/// suite runs without MongoDB or Redis.
pub async fn create_test_app() -> Router {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let app_state = Arc::new(AppState::new(
        test_config(),
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryCache::new()),
    ));

    create_router(app_state)
}

/// One request against the router, returning status and parsed body.
/// Panics with the raw body on JSON that fails to parse so test
/// failures stay readable.
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            panic!(
                "non-JSON body (status {}): {}",
                status,
                String::from_utf8_lossy(&bytes)
            )
        })
    };
    (status, json)
}

/// Raw body variant for assertions on the wire text itself.
pub async fn send_raw(app: &Router, method: &str, uri: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

pub async fn create_quiz(app: &Router, user_id: i64, title: &str) -> i64 {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/quizzes",
        Some(serde_json::json!({ "user_id": user_id, "title": title })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create quiz failed: {}", body);
    body["_id"].as_i64().unwrap()
}

pub async fn create_question(app: &Router, quiz_id: i64, text: &str) -> i64 {
    let (status, body) = send(
        app,
        "POST",
        &format!("/api/v1/quizzes/{}/questions", quiz_id),
        Some(serde_json::json!({ "text": text })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create question failed: {}", body);
    body["_id"].as_i64().unwrap()
}

pub async fn create_choice(app: &Router, question_id: i64, text: &str, is_correct: bool) -> i64 {
    let (status, body) = send(
        app,
        "POST",
        &format!("/api/v1/quizzes/questions/{}/choices", question_id),
        Some(serde_json::json!({ "text": text, "is_correct": is_correct })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create choice failed: {}", body);
    body["_id"].as_i64().unwrap()
}

/// Seeds the 100-question, 5-choice sample quiz and returns its id.
pub async fn seed_sample_quiz(app: &Router, user_id: i64) -> i64 {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/quizzes/sample",
        Some(serde_json::json!({
            "user_id": user_id,
            "title": "Sample quiz",
            "description": "Seeded for tests"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "sample seed failed: {}", body);
    body["_id"].as_i64().unwrap()
}
