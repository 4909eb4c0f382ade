//! Tracker tuning knobs.

use std::time::Duration;

/// Default period between background flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Default bound on the final flush performed by `stop`.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a critical alert notification.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of entries in `ErrorStats::top_errors`.
pub const DEFAULT_TOP_ERRORS: u32 = 10;

/// Default age, in days, after which resolved entries are purged by cleanup.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Runtime configuration for an [`ErrorTracker`](crate::ErrorTracker).
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Period between background flushes.
    pub flush_interval: Duration,
    /// Upper bound on the final flush at shutdown.
    pub shutdown_timeout: Duration,
    /// Upper bound on a critical alert notification before capture returns.
    pub notify_timeout: Duration,
    /// Log every capture at debug level, for local development.
    pub echo_captures: bool,
    /// Size of the top-offenders list in stats.
    pub top_errors: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
            echo_captures: false,
            top_errors: DEFAULT_TOP_ERRORS,
        }
    }
}
