//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use faultline_core::clock::Clock;
use faultline_store::PgErrorStore;
use faultline_test_support::{FixedClock, RecordingNotifier};
use faultline_tracker::{ErrorTracker, TrackerConfig};
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use faultline_api::routes;
use faultline_api::state::AppState;

/// Fixed timestamp used across all integration tests.
pub fn fixed_now() -> chrono::DateTime<chrono::Utc> {
    chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap()
}

/// Build a tracker backed by a real `PgErrorStore` and a deterministic clock.
pub fn build_tracker(pool: PgPool) -> Arc<ErrorTracker> {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock(fixed_now()));
    Arc::new(ErrorTracker::new(
        Arc::new(PgErrorStore::new(pool)),
        Arc::new(RecordingNotifier::new()),
        clock,
        TrackerConfig::default(),
    ))
}

/// Build the full app router. Uses the same route structure as `main.rs`.
pub fn build_test_app(tracker: Arc<ErrorTracker>) -> Router {
    routes::app(AppState::new(tracker))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a POST request without a body and return the response.
pub async fn post_empty(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}
