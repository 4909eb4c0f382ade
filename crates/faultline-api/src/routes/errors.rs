//! Routes for capturing errors and operating on the aggregated log.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use faultline_core::context::ErrorContext;
use faultline_core::entry::{CapturedError, Category, Severity};
use faultline_core::error::TrackerError;
use faultline_core::query::{ErrorFilter, ErrorPage, ErrorStats};
use faultline_tracker::CaptureOptions;
use faultline_tracker::config::DEFAULT_RETENTION_DAYS;

use crate::error::ApiError;
use crate::state::AppState;

fn default_error_name() -> String {
    "Error".to_string()
}

/// Request body for POST / (remote capture).
#[derive(Debug, Deserialize)]
pub struct CaptureRequest {
    /// Error type name.
    #[serde(default = "default_error_name")]
    pub name: String,
    /// Error message.
    pub message: String,
    /// Trace text; its second line is used as the call site.
    #[serde(default)]
    pub stack: Option<String>,
    /// Request and user context. Sensitive fields are redacted on capture.
    #[serde(default)]
    pub context: ErrorContext,
    /// Overrides category inference.
    #[serde(default)]
    pub category: Option<Category>,
    /// Overrides severity inference.
    #[serde(default)]
    pub severity: Option<Severity>,
    /// Opaque caller data.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Response body for a capture.
#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    /// Id of the aggregate entry the occurrence was counted in.
    pub id: String,
}

/// Request body for POST /cleanup.
#[derive(Debug, Default, Deserialize)]
pub struct CleanupRequest {
    /// Purge resolved entries resolved more than this many days ago.
    #[serde(default)]
    pub older_than_days: Option<u32>,
}

/// Response body for POST /cleanup.
#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    /// Entries removed.
    pub deleted: u64,
}

/// POST /
#[instrument(skip(state, request), fields(name = %request.name))]
async fn capture_error(
    State(state): State<AppState>,
    Json(request): Json<CaptureRequest>,
) -> Result<(StatusCode, Json<CaptureResponse>), ApiError> {
    if request.message.trim().is_empty() {
        return Err(TrackerError::Validation("message must not be empty".into()).into());
    }

    let mut error = CapturedError::new(request.name, request.message);
    if let Some(stack) = request.stack {
        error = error.with_stack(stack);
    }
    let options = CaptureOptions {
        category: request.category,
        severity: request.severity,
        metadata: request.metadata,
    };

    let id = state.tracker.capture(&error, request.context, options).await;
    info!(id = %id, "captured remote error");

    Ok((StatusCode::ACCEPTED, Json(CaptureResponse { id })))
}

/// GET /
#[instrument(skip(state))]
async fn list_errors(
    State(state): State<AppState>,
    Query(filter): Query<ErrorFilter>,
) -> Result<Json<ErrorPage>, ApiError> {
    let page = state.tracker.list(&filter).await?;
    Ok(Json(page))
}

/// GET /stats
#[instrument(skip(state))]
async fn error_stats(State(state): State<AppState>) -> Result<Json<ErrorStats>, ApiError> {
    let stats = state.tracker.stats().await?;
    Ok(Json(stats))
}

/// POST /{fingerprint}/resolve
#[instrument(skip(state))]
async fn resolve_error(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.tracker.resolve(&fingerprint).await {
        info!("resolved error entry");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(TrackerError::NotFound(fingerprint).into())
    }
}

/// POST /{fingerprint}/unresolve
#[instrument(skip(state))]
async fn unresolve_error(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.tracker.unresolve(&fingerprint).await {
        info!("reopened error entry");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(TrackerError::NotFound(fingerprint).into())
    }
}

/// POST /cleanup
#[instrument(skip(state, request))]
async fn cleanup_errors(
    State(state): State<AppState>,
    request: Option<Json<CleanupRequest>>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let Json(request) = request.unwrap_or_default();
    let older_than_days = request.older_than_days.unwrap_or(DEFAULT_RETENTION_DAYS);

    let deleted = state.tracker.cleanup(older_than_days).await?;

    Ok(Json(CleanupResponse { deleted }))
}

/// Returns the router for the error log.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_errors).post(capture_error))
        .route("/stats", get(error_stats))
        .route("/cleanup", post(cleanup_errors))
        .route("/{fingerprint}/resolve", post(resolve_error))
        .route("/{fingerprint}/unresolve", post(unresolve_error))
}
