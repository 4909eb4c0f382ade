//! Faultline Tracker: the error aggregation and reporting pipeline.
//!
//! Captured errors are sanitised, classified and fingerprinted, counted in an
//! in-memory dedup buffer, and flushed to a [`PersistenceGateway`] on a timer
//! or immediately for critical severity.
//!
//! [`PersistenceGateway`]: faultline_core::gateway::PersistenceGateway

pub mod application;
pub mod config;
pub mod domain;

pub use application::notifier::LogNotifier;
pub use application::tracker::{CaptureOptions, ErrorTracker, with_error_tracking};
pub use config::TrackerConfig;
