//! Integration tests for the error log endpoints against Postgres.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use sqlx::PgPool;

fn capture_body(message: &str) -> serde_json::Value {
    serde_json::json!({
        "name": "QueryError",
        "message": message,
        "stack": format!("QueryError: {message}\n    at OrderRepository.find (orders.rs:42)"),
        "context": {
            "url": "/api/orders",
            "params": { "apiKey": "sk_live_123", "orderId": 7 }
        }
    })
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_repeated_captures_flush_as_one_counted_entry(pool: PgPool) {
    // Arrange
    let tracker = common::build_tracker(pool);
    let app = common::build_test_app(Arc::clone(&tracker));

    // Act
    for _ in 0..3 {
        let (status, _) =
            common::post_json(app.clone(), "/api/v1/errors", &capture_body("sql syntax error")).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }
    tracker.flush_now().await;
    let (status, json) = common::get_json(app, "/api/v1/errors").await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);
    let entry = &json["errors"][0];
    assert_eq!(entry["count"], 3);
    assert_eq!(entry["category"], "database");
    assert_eq!(entry["severity"], "medium");
    assert_eq!(entry["context"]["params"]["apiKey"], "[REDACTED]");
    assert_eq!(entry["context"]["params"]["orderId"], 7);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_second_flush_increments_stored_count(pool: PgPool) {
    let tracker = common::build_tracker(pool);
    let app = common::build_test_app(Arc::clone(&tracker));

    common::post_json(app.clone(), "/api/v1/errors", &capture_body("sql syntax error")).await;
    tracker.flush_now().await;
    common::post_json(app.clone(), "/api/v1/errors", &capture_body("sql syntax error")).await;
    tracker.flush_now().await;

    let (_, json) = common::get_json(app, "/api/v1/errors").await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["errors"][0]["count"], 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_critical_capture_is_visible_without_flush(pool: PgPool) {
    let tracker = common::build_tracker(pool);
    let app = common::build_test_app(Arc::clone(&tracker));
    let body = serde_json::json!({
        "name": "PrismaClientError",
        "message": "Database connection pool exhausted"
    });

    let (status, captured) = common::post_json(app.clone(), "/api/v1/errors", &body).await;
    let (_, json) = common::get_json(app, "/api/v1/errors?severity=critical").await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["total"], 1);
    assert_eq!(json["errors"][0]["id"], captured["id"]);
    assert_eq!(tracker.buffered_len(), 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_resolve_unresolve_and_cleanup_lifecycle(pool: PgPool) {
    // Arrange
    let tracker = common::build_tracker(pool);
    let app = common::build_test_app(Arc::clone(&tracker));
    common::post_json(app.clone(), "/api/v1/errors", &capture_body("sql syntax error")).await;
    tracker.flush_now().await;
    let (_, listed) = common::get_json(app.clone(), "/api/v1/errors").await;
    let fingerprint = listed["errors"][0]["fingerprint"].as_str().unwrap().to_string();

    // Act
    let (resolved, _) =
        common::post_empty(app.clone(), &format!("/api/v1/errors/{fingerprint}/resolve")).await;
    let (_, stats_after_resolve) = common::get_json(app.clone(), "/api/v1/errors/stats").await;
    let (reopened, _) =
        common::post_empty(app.clone(), &format!("/api/v1/errors/{fingerprint}/unresolve")).await;
    let (_, open) = common::get_json(app.clone(), "/api/v1/errors?resolved=false").await;
    let (cleaned, cleanup) = common::post_json(
        app,
        "/api/v1/errors/cleanup",
        &serde_json::json!({ "older_than_days": 0 }),
    )
    .await;

    // Assert
    assert_eq!(resolved, StatusCode::NO_CONTENT);
    assert_eq!(stats_after_resolve["total"], 1);
    assert_eq!(stats_after_resolve["unresolved"], 0);
    assert_eq!(reopened, StatusCode::NO_CONTENT);
    assert_eq!(open["total"], 1);
    assert_eq!(open["errors"][0]["resolved_at"], serde_json::Value::Null);
    assert_eq!(cleaned, StatusCode::OK);
    assert_eq!(cleanup["deleted"], 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_resolve_unknown_fingerprint_returns_404(pool: PgPool) {
    let app = common::build_test_app(common::build_tracker(pool));

    let (status, json) = common::post_empty(app, "/api/v1/errors/deadbeef/resolve").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_stats_on_empty_store(pool: PgPool) {
    let app = common::build_test_app(common::build_tracker(pool));

    let (status, json) = common::get_json(app, "/api/v1/errors/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 0);
    assert_eq!(json["last_24h"], 0);
    assert_eq!(json["top_errors"], serde_json::json!([]));
}
