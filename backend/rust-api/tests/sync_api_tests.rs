mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use base64::{engine::general_purpose, Engine as _};
use common::{create_test_app, quiz_attempt_json, send_json, submission_json};
use studynest_api::{config::Config, models::Collection};
use tower::ServiceExt;

#[tokio::test]
async fn test_sync_upsert_is_idempotent_on_id() {
    let app = create_test_app(Config::default());
    let record = submission_json("sub-1", "student-1");

    let (status, first) = send_json(
        &app.router,
        Method::POST,
        "/api/sync/submissions",
        Some(&record),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["id"], "sub-1");
    assert_eq!(first["syncStatus"], "synced");
    assert_eq!(first["created"], true);

    let (status, second) = send_json(
        &app.router,
        Method::POST,
        "/api/sync/submissions",
        Some(&record),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["created"], false);

    assert_eq!(app.records.len(Collection::Submissions).await, 1);
}

#[tokio::test]
async fn test_server_copy_is_stamped_synced() {
    let app = create_test_app(Config::default());
    let record = quiz_attempt_json("attempt-1", "student-1");

    let (status, _) = send_json(
        &app.router,
        Method::POST,
        "/api/sync/quizAttempts",
        Some(&record),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, stored) = send_json(
        &app.router,
        Method::GET,
        "/api/sync/quizAttempts/attempt-1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let mut expected = record;
    expected["syncStatus"] = serde_json::json!("synced");
    assert_eq!(stored, expected);
}

#[tokio::test]
async fn test_unknown_collection_returns_404() {
    let app = create_test_app(Config::default());

    let (status, body) = send_json(
        &app.router,
        Method::POST,
        "/api/sync/grades",
        Some(&submission_json("x", "student-1")),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_malformed_body_returns_json_400() {
    let app = create_test_app(Config::default());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/sync/submissions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, body) = send_json(
        &app.router,
        Method::POST,
        "/api/sync/submissions",
        Some(&serde_json::json!({"id": "sub-1", "content": "missing fields"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
    assert_eq!(app.records.len(Collection::Submissions).await, 0);
}

#[tokio::test]
async fn test_blank_required_field_fails_validation() {
    let app = create_test_app(Config::default());
    let mut record = submission_json("sub-1", "student-1");
    record["studentId"] = serde_json::json!("");

    let (status, body) = send_json(
        &app.router,
        Method::POST,
        "/api/sync/submissions",
        Some(&record),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Validation error"));
}

#[tokio::test]
async fn test_get_missing_record_returns_404() {
    let app = create_test_app(Config::default());

    let (status, _) = send_json(
        &app.router,
        Method::GET,
        "/api/sync/submissions/nope",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_records_filters_by_student() {
    let app = create_test_app(Config::default());
    for (id, student) in [("s-1", "alice"), ("s-2", "bob"), ("s-3", "alice")] {
        let (status, _) = send_json(
            &app.router,
            Method::POST,
            "/api/sync/submissions",
            Some(&submission_json(id, student)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send_json(
        &app.router,
        Method::GET,
        "/api/sync/submissions?studentId=alice",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["s-1", "s-3"]);

    let (status, _) = send_json(&app.router, Method::GET, "/api/sync/submissions", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_reports_ai_disabled() {
    let app = create_test_app(Config::default());

    let (status, body) = send_json(&app.router, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["dependencies"]["ai"]["status"], "disabled");
}

#[tokio::test]
async fn test_metrics_requires_basic_auth() {
    let app = create_test_app(Config::default());

    let (status, _) = send_json(&app.router, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let credentials = general_purpose::STANDARD.encode("admin:changeme");
    let request = Request::builder()
        .uri("/metrics")
        .header(header::AUTHORIZATION, format!("Basic {}", credentials))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
