//! Shared application state.

use std::sync::Arc;

use faultline_tracker::ErrorTracker;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The process-wide error tracker.
    pub tracker: Arc<ErrorTracker>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(tracker: Arc<ErrorTracker>) -> Self {
        Self { tracker }
    }
}
