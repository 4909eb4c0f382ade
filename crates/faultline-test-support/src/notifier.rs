//! Mock `CriticalAlertNotifier` implementations for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use faultline_core::entry::ErrorEntry;
use faultline_core::error::TrackerError;
use faultline_core::notifier::CriticalAlertNotifier;

/// A notifier that records every entry it is asked to alert on.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notified: Mutex<Vec<ErrorEntry>>,
}

impl RecordingNotifier {
    /// Creates a notifier with no recorded alerts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all alerted entries.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn notified(&self) -> Vec<ErrorEntry> {
        self.notified.lock().unwrap().clone()
    }
}

#[async_trait]
impl CriticalAlertNotifier for RecordingNotifier {
    async fn notify(&self, entry: &ErrorEntry) -> Result<(), TrackerError> {
        self.notified.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

/// A notifier whose transport is always down.
#[derive(Debug)]
pub struct FailingNotifier;

#[async_trait]
impl CriticalAlertNotifier for FailingNotifier {
    async fn notify(&self, _entry: &ErrorEntry) -> Result<(), TrackerError> {
        Err(TrackerError::Infrastructure("webhook unreachable".into()))
    }
}

/// A notifier whose transport never answers.
#[derive(Debug)]
pub struct HangingNotifier;

#[async_trait]
impl CriticalAlertNotifier for HangingNotifier {
    async fn notify(&self, _entry: &ErrorEntry) -> Result<(), TrackerError> {
        std::future::pending().await
    }
}
