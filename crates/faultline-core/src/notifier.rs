//! Critical alert channel abstraction.

use async_trait::async_trait;

use crate::entry::ErrorEntry;
use crate::error::TrackerError;

/// Receives critical-severity errors once they have been persisted.
///
/// Implementations deliver to email, chat or paging systems. A failure here
/// is logged by the tracker and never reaches the code that captured the
/// error.
#[async_trait]
pub trait CriticalAlertNotifier: Send + Sync {
    /// Delivers an alert for `entry`.
    async fn notify(&self, entry: &ErrorEntry) -> Result<(), TrackerError>;
}
