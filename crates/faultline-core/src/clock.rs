//! Clock abstraction so capture timestamps and retention cutoffs are testable.

use chrono::{DateTime, TimeDelta, Utc};

/// Source of "now" for occurrence timestamps and time-windowed queries.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the instant `window` before now.
    fn since(&self, window: TimeDelta) -> DateTime<Utc> {
        self.now() - window
    }
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
