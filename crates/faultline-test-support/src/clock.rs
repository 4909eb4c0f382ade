//! Test clock pinned to one instant.

use chrono::{DateTime, Utc};
use faultline_core::clock::Clock;

/// A clock that always returns a fixed point in time, so capture timestamps,
/// the 24-hour stats window and retention cutoffs are predictable.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
