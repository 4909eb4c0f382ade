//! Periodic and on-demand flushing of the dedup buffer.
//!
//! Only one flush runs at a time. A caller of [`FlushScheduler::flush_now`]
//! that arrives while another flush is in progress waits for it and then
//! flushes whatever accumulated meanwhile.
//!
//! A drained batch is written by its own task, so dropping the caller's
//! future does not drop the batch. The task keeps the flush lock until the
//! batch is persisted or requeued.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use faultline_core::entry::ErrorEntry;
use faultline_core::gateway::PersistenceGateway;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::domain::buffer::DedupBuffer;

/// What a single flush did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Entries written to the store.
    pub persisted: usize,
    /// Entries put back into the buffer after a store failure.
    pub requeued: usize,
}

impl FlushOutcome {
    /// Returns `true` if the store rejected part of the batch.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.requeued > 0
    }
}

#[derive(Debug, Default)]
struct FlushProgress {
    flushing: AtomicBool,
    in_flight: AtomicU64,
}

/// The drained entries a flush has not yet persisted.
///
/// Dropping it before the batch completes (task aborted, store panicked)
/// puts the remainder back into the buffer.
struct PendingBatch {
    entries: VecDeque<ErrorEntry>,
    buffer: Arc<DedupBuffer>,
    progress: Arc<FlushProgress>,
}

impl PendingBatch {
    fn new(entries: Vec<ErrorEntry>, buffer: Arc<DedupBuffer>, progress: Arc<FlushProgress>) -> Self {
        let occurrences: u64 = entries.iter().map(|entry| entry.count).sum();
        progress.in_flight.store(occurrences, Ordering::Release);
        progress.flushing.store(true, Ordering::Release);
        Self {
            entries: entries.into(),
            buffer,
            progress,
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn front(&self) -> Option<&ErrorEntry> {
        self.entries.front()
    }

    fn mark_persisted(&mut self) {
        if let Some(entry) = self.entries.pop_front() {
            self.progress.in_flight.fetch_sub(entry.count, Ordering::AcqRel);
        }
    }

    fn requeue_remaining(&mut self) -> usize {
        let remaining: Vec<ErrorEntry> = self.entries.drain(..).collect();
        let requeued = remaining.len();
        // Back in the buffer before leaving the in-flight count.
        self.buffer.requeue(remaining);
        self.progress.in_flight.store(0, Ordering::Release);
        requeued
    }
}

impl Drop for PendingBatch {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            let requeued = self.requeue_remaining();
            warn!(requeued, "flush interrupted; requeued unpersisted errors");
        }
        self.progress.in_flight.store(0, Ordering::Release);
        self.progress.flushing.store(false, Ordering::Release);
    }
}

/// Drains the buffer into the store, one flush at a time.
pub struct FlushScheduler {
    buffer: Arc<DedupBuffer>,
    gateway: Arc<dyn PersistenceGateway>,
    flush_lock: Arc<Mutex<()>>,
    progress: Arc<FlushProgress>,
}

impl FlushScheduler {
    /// Creates a scheduler over `buffer` writing to `gateway`.
    #[must_use]
    pub fn new(buffer: Arc<DedupBuffer>, gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            buffer,
            gateway,
            flush_lock: Arc::new(Mutex::new(())),
            progress: Arc::new(FlushProgress::default()),
        }
    }

    /// Returns `true` while a flush is writing to the store.
    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.progress.flushing.load(Ordering::Acquire)
    }

    /// Occurrences drained by the running flush and not yet persisted.
    #[must_use]
    pub fn in_flight_occurrences(&self) -> u64 {
        self.progress.in_flight.load(Ordering::Acquire)
    }

    /// Drains the buffer and persists every entry with an increment upsert.
    ///
    /// On the first store failure the failed entry and every entry not yet
    /// attempted are requeued into the buffer; entries already persisted are
    /// not, since requeueing them would count them twice. Failures are
    /// logged, not returned.
    ///
    /// Cancelling the returned future does not cancel the flush: the batch
    /// keeps being written in the background.
    pub async fn flush_now(&self) -> FlushOutcome {
        let lock = Arc::clone(&self.flush_lock).lock_owned().await;
        let batch = self.buffer.drain();
        if batch.is_empty() {
            return FlushOutcome::default();
        }

        let pending = PendingBatch::new(batch, Arc::clone(&self.buffer), Arc::clone(&self.progress));
        let gateway = Arc::clone(&self.gateway);
        let task = tokio::spawn(async move {
            let outcome = write_batch(gateway.as_ref(), pending).await;
            drop(lock);
            outcome
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "flush task terminated abnormally");
                FlushOutcome::default()
            }
        }
    }

    /// Spawns the background loop that flushes every `interval` until
    /// [`FlushHandle::shutdown`] is called.
    #[must_use]
    pub fn spawn(self: Arc<Self>, interval: Duration) -> FlushHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let join_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.flush_now().await;
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
            debug!("flush loop stopped");
        });

        FlushHandle {
            shutdown_tx: Some(shutdown_tx),
            join_handle,
        }
    }
}

async fn write_batch(gateway: &dyn PersistenceGateway, mut batch: PendingBatch) -> FlushOutcome {
    let total = batch.len();
    let mut persisted = 0;
    while let Some(entry) = batch.front() {
        if let Err(err) = gateway.upsert_increment(entry).await {
            let requeued = batch.requeue_remaining();
            error!(error = %err, persisted, requeued, "failed to persist buffered errors");
            warn!(requeued, "requeued unpersisted errors for the next flush");
            return FlushOutcome {
                persisted,
                requeued,
            };
        }
        batch.mark_persisted();
        persisted += 1;
    }

    debug!(persisted = total, "flushed buffered errors");
    FlushOutcome {
        persisted,
        requeued: 0,
    }
}

/// Handle to the background flush loop.
#[derive(Debug)]
pub struct FlushHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join_handle: JoinHandle<()>,
}

impl FlushHandle {
    /// Stops the loop and waits for it to exit. A flush already running
    /// completes first.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(err) = self.join_handle.await {
            error!(error = %err, "flush loop terminated abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};
    use faultline_core::context::ErrorContext;
    use faultline_core::entry::{Category, Severity};
    use faultline_test_support::{FailingErrorStore, FlakyErrorStore, InMemoryErrorStore, SlowErrorStore};

    use crate::domain::buffer::Occurrence;

    fn occurrence(message: &str) -> Occurrence {
        Occurrence {
            name: "Error".to_owned(),
            message: message.to_owned(),
            stack: None,
            category: Category::Runtime,
            severity: Severity::Medium,
            context: ErrorContext::default(),
            metadata: None,
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_flush_persists_and_clears_buffer() {
        // Arrange
        let buffer = Arc::new(DedupBuffer::new());
        let store = Arc::new(InMemoryErrorStore::new());
        let scheduler = FlushScheduler::new(Arc::clone(&buffer), store.clone());
        buffer.upsert("a", occurrence("a"));
        buffer.upsert("a", occurrence("a"));
        buffer.upsert("b", occurrence("b"));

        // Act
        let outcome = scheduler.flush_now().await;

        // Assert
        assert_eq!(outcome, FlushOutcome { persisted: 2, requeued: 0 });
        assert!(buffer.is_empty());
        assert_eq!(store.get("a").unwrap().count, 2);
        assert_eq!(store.get("b").unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_empty_flush_does_not_touch_store() {
        let buffer = Arc::new(DedupBuffer::new());
        let store = Arc::new(InMemoryErrorStore::new());
        let scheduler = FlushScheduler::new(buffer, store.clone());

        let outcome = scheduler.flush_now().await;

        assert_eq!(outcome, FlushOutcome::default());
        assert_eq!(store.upsert_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_flush_requeues_entries() {
        // Arrange
        let buffer = Arc::new(DedupBuffer::new());
        let scheduler = FlushScheduler::new(Arc::clone(&buffer), Arc::new(FailingErrorStore));
        buffer.upsert("a", occurrence("a"));
        buffer.upsert("a", occurrence("a"));
        buffer.upsert("b", occurrence("b"));

        // Act
        let outcome = scheduler.flush_now().await;

        // Assert
        assert!(outcome.failed());
        assert_eq!(outcome.requeued, 2);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.pending_occurrences(), 3);
        assert!(!scheduler.is_flushing());
    }

    #[tokio::test]
    async fn test_partial_failure_requeues_only_unpersisted_entries() {
        // Arrange
        let buffer = Arc::new(DedupBuffer::new());
        let store = Arc::new(FlakyErrorStore::new(vec![true, false]));
        let scheduler = FlushScheduler::new(Arc::clone(&buffer), store.clone());
        buffer.upsert("a", occurrence("a"));
        buffer.upsert("b", occurrence("b"));
        buffer.upsert("c", occurrence("c"));

        // Act
        let first = scheduler.flush_now().await;
        let second = scheduler.flush_now().await;

        // Assert
        assert_eq!(first, FlushOutcome { persisted: 1, requeued: 2 });
        assert_eq!(second, FlushOutcome { persisted: 2, requeued: 0 });
        let stored = store.inner().entries();
        assert_eq!(stored.len(), 3);
        assert!(stored.iter().all(|entry| entry.count == 1));
    }

    #[tokio::test]
    async fn test_requeued_counts_survive_until_store_recovers() {
        // Arrange
        let buffer = Arc::new(DedupBuffer::new());
        let store = Arc::new(FlakyErrorStore::new(vec![false]));
        let scheduler = FlushScheduler::new(Arc::clone(&buffer), store.clone());
        buffer.upsert("fp", occurrence("first"));
        scheduler.flush_now().await;

        // Act
        buffer.upsert("fp", occurrence("second"));
        scheduler.flush_now().await;

        // Assert
        let entry = store.inner().get("fp").unwrap();
        assert_eq!(entry.count, 2);
        assert_eq!(entry.message, "second");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_flushes_never_overlap() {
        // Arrange
        let buffer = Arc::new(DedupBuffer::new());
        let store = Arc::new(SlowErrorStore::new(Duration::from_millis(5)));
        let scheduler = Arc::new(FlushScheduler::new(Arc::clone(&buffer), store.clone()));

        // Act
        let mut tasks = Vec::new();
        for i in 0..8 {
            let buffer = Arc::clone(&buffer);
            let scheduler = Arc::clone(&scheduler);
            tasks.push(tokio::spawn(async move {
                buffer.upsert(&format!("fp-{}", i % 3), occurrence("boom"));
                scheduler.flush_now().await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // Assert
        assert_eq!(store.max_in_flight(), 1);
        let total: u64 = store.inner().entries().iter().map(|e| e.count).sum();
        assert_eq!(total, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_flush_still_persists_its_batch() {
        // Arrange
        let buffer = Arc::new(DedupBuffer::new());
        let store = Arc::new(SlowErrorStore::new(Duration::from_secs(10)));
        let scheduler = FlushScheduler::new(Arc::clone(&buffer), store.clone());
        for i in 0..15 {
            buffer.upsert(&format!("fp-{}", i % 3), occurrence("boom"));
        }

        // Act
        let result = tokio::time::timeout(Duration::from_secs(1), scheduler.flush_now()).await;

        // Assert
        assert!(result.is_err());
        assert!(scheduler.is_flushing());
        assert_eq!(buffer.pending_occurrences() + scheduler.in_flight_occurrences(), 15);

        tokio::time::sleep(Duration::from_secs(60)).await;
        let stored: u64 = store.inner().entries().iter().map(|e| e.count).sum();
        assert_eq!(stored, 15);
        assert!(buffer.is_empty());
        assert!(!scheduler.is_flushing());
        assert_eq!(scheduler.in_flight_occurrences(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_after_cancelled_flush_waits_for_its_batch() {
        // Arrange
        let buffer = Arc::new(DedupBuffer::new());
        let store = Arc::new(SlowErrorStore::new(Duration::from_secs(10)));
        let scheduler = FlushScheduler::new(Arc::clone(&buffer), store.clone());
        buffer.upsert("a", occurrence("a"));
        buffer.upsert("b", occurrence("b"));
        let _ = tokio::time::timeout(Duration::from_secs(1), scheduler.flush_now()).await;
        buffer.upsert("a", occurrence("a"));

        // Act
        let outcome = scheduler.flush_now().await;

        // Assert
        assert_eq!(outcome, FlushOutcome { persisted: 1, requeued: 0 });
        assert_eq!(store.inner().get("a").unwrap().count, 2);
        assert_eq!(store.inner().get("b").unwrap().count, 1);
        assert_eq!(store.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_dropped_batch_returns_to_buffer() {
        let buffer = Arc::new(DedupBuffer::new());
        let progress = Arc::new(FlushProgress::default());
        buffer.upsert("a", occurrence("a"));
        buffer.upsert("a", occurrence("a"));
        buffer.upsert("b", occurrence("b"));
        let pending = PendingBatch::new(buffer.drain(), Arc::clone(&buffer), Arc::clone(&progress));
        assert_eq!(progress.in_flight.load(Ordering::Acquire), 3);

        drop(pending);

        assert_eq!(buffer.pending_occurrences(), 3);
        assert_eq!(progress.in_flight.load(Ordering::Acquire), 0);
        assert!(!progress.flushing.load(Ordering::Acquire));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_loop_flushes_on_each_tick() {
        // Arrange
        let buffer = Arc::new(DedupBuffer::new());
        let store = Arc::new(InMemoryErrorStore::new());
        let scheduler = Arc::new(FlushScheduler::new(Arc::clone(&buffer), store.clone()));
        let handle = Arc::clone(&scheduler).spawn(Duration::from_secs(30));
        buffer.upsert("fp", occurrence("boom"));

        // Act
        tokio::time::sleep(Duration::from_secs(31)).await;

        // Assert
        assert_eq!(store.get("fp").unwrap().count, 1);
        assert!(buffer.is_empty());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_loop_before_next_tick() {
        let buffer = Arc::new(DedupBuffer::new());
        let store = Arc::new(InMemoryErrorStore::new());
        let scheduler = Arc::new(FlushScheduler::new(Arc::clone(&buffer), store.clone()));
        let handle = Arc::clone(&scheduler).spawn(Duration::from_secs(30));

        handle.shutdown().await;
        buffer.upsert("fp", occurrence("boom"));
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(store.upsert_calls(), 0);
        assert_eq!(buffer.len(), 1);
    }
}
