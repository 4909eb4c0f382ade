//! HTTP routes.

pub mod errors;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Builds the application router with state attached. Middleware layers are
/// added by the binary.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest("/api/v1/errors", errors::router())
        .with_state(state)
}
