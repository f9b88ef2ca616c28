#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use studynest_api::{
    config::Config,
    create_router,
    services::{record_repository::InMemoryRecordRepository, AppState},
};
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub records: Arc<InMemoryRecordRepository>,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Router backed by an in-memory repository. AI routes stay disabled unless
/// `config.ai.api_key` is set.
pub fn create_test_app(config: Config) -> TestApp {
    init_tracing();

    let records = Arc::new(InMemoryRecordRepository::new());
    let app_state = Arc::new(
        AppState::with_repository(config, records.clone())
            .expect("Failed to initialize test app state"),
    );

    TestApp {
        router: create_router(app_state),
        records,
    }
}

pub async fn send_json(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<&Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(value).unwrap())
        }
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };

    (status, json)
}

pub fn submission_json(id: &str, student_id: &str) -> Value {
    serde_json::json!({
        "id": id,
        "assignmentId": "assignment-1",
        "studentId": student_id,
        "content": "My essay about photosynthesis",
        "submittedAt": "2026-03-01T09:30:00Z",
        "syncStatus": "pending"
    })
}

pub fn quiz_attempt_json(id: &str, student_id: &str) -> Value {
    serde_json::json!({
        "id": id,
        "quizId": "quiz-1",
        "studentId": student_id,
        "answers": [0, "b", {"text": "free form"}],
        "score": 0.75,
        "completedAt": "2026-03-01T09:00:00Z",
        "syncStatus": "offline"
    })
}
