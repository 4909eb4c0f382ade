//! Default critical alert channel.

use async_trait::async_trait;
use faultline_core::entry::ErrorEntry;
use faultline_core::error::TrackerError;
use faultline_core::notifier::CriticalAlertNotifier;
use tracing::error;

/// Notifier that writes critical errors to the log. Used when no external
/// alert transport is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl CriticalAlertNotifier for LogNotifier {
    async fn notify(&self, entry: &ErrorEntry) -> Result<(), TrackerError> {
        error!(
            id = %entry.id,
            fingerprint = %entry.fingerprint,
            category = %entry.category,
            message = %entry.message,
            url = entry.context.url.as_deref(),
            "critical error captured"
        );
        Ok(())
    }
}
