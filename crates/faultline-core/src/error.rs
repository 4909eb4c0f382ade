//! Tracker error types.

use thiserror::Error;

/// Errors raised by the tracker's collaborators and operator-facing queries.
///
/// Failures on the capture path never surface to the caller; they are logged
/// and swallowed. This type is what the store, the notifier and the query
/// API report.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// No error entry exists for the given fingerprint.
    #[error("error entry not found: {0}")]
    NotFound(String),

    /// Caller input could not be interpreted.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
