//! The error tracker service: capture, query and lifecycle.
//!
//! Capture is fail-open. Nothing on the capture path returns an error to the
//! caller; store and notifier failures are logged instead.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::TimeDelta;
use faultline_core::clock::Clock;
use faultline_core::context::{ErrorContext, RequestInfo};
use faultline_core::entry::{CapturedError, Category, Severity};
use faultline_core::error::TrackerError;
use faultline_core::gateway::PersistenceGateway;
use faultline_core::notifier::CriticalAlertNotifier;
use faultline_core::query::{EntryOrder, EntryPatch, ErrorFilter, ErrorPage, ErrorStats, RetentionFilter};
use tracing::{debug, error, info, instrument, warn};

use crate::application::scheduler::{FlushHandle, FlushOutcome, FlushScheduler};
use crate::application::stats::StatsAggregator;
use crate::config::TrackerConfig;
use crate::domain::buffer::{DedupBuffer, Occurrence};
use crate::domain::{classifier, fingerprint, sanitizer};

/// Header carrying the caller's request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Explicit classification and metadata for a capture.
#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    /// Skip category inference.
    pub category: Option<Category>,
    /// Skip severity inference.
    pub severity: Option<Severity>,
    /// Opaque caller data stored with the entry.
    pub metadata: Option<serde_json::Value>,
}

/// Process-wide error aggregation service.
///
/// Construct one per process (or per test) with its collaborators, call
/// [`start`](Self::start) to begin periodic flushing and
/// [`stop`](Self::stop) before exit.
pub struct ErrorTracker {
    buffer: Arc<DedupBuffer>,
    scheduler: Arc<FlushScheduler>,
    stats: StatsAggregator,
    gateway: Arc<dyn PersistenceGateway>,
    notifier: Arc<dyn CriticalAlertNotifier>,
    clock: Arc<dyn Clock>,
    config: TrackerConfig,
    flush_task: Mutex<Option<FlushHandle>>,
}

impl ErrorTracker {
    /// Creates a tracker. No background work starts until `start`.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        notifier: Arc<dyn CriticalAlertNotifier>,
        clock: Arc<dyn Clock>,
        config: TrackerConfig,
    ) -> Self {
        let buffer = Arc::new(DedupBuffer::new());
        let scheduler = Arc::new(FlushScheduler::new(Arc::clone(&buffer), Arc::clone(&gateway)));
        let stats = StatsAggregator::new(Arc::clone(&gateway), Arc::clone(&clock), config.top_errors);
        Self {
            buffer,
            scheduler,
            stats,
            gateway,
            notifier,
            clock,
            config,
            flush_task: Mutex::new(None),
        }
    }

    /// Starts the periodic flush loop on the current tokio runtime. Calling
    /// it again while running has no effect.
    pub fn start(&self) {
        let mut task = self.flush_task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            warn!("error tracker already started");
            return;
        }
        *task = Some(Arc::clone(&self.scheduler).spawn(self.config.flush_interval));
        info!(interval_secs = self.config.flush_interval.as_secs(), "error tracker started");
    }

    /// Stops the flush loop and makes one final flush attempt bounded by
    /// the configured shutdown timeout. Occurrences that still cannot be
    /// persisted are logged as lost. A final flush that times out keeps
    /// writing for as long as the runtime lives.
    pub async fn stop(&self) {
        let task = self.flush_task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = task {
            handle.shutdown().await;
        }

        match tokio::time::timeout(self.config.shutdown_timeout, self.scheduler.flush_now()).await {
            Ok(outcome) if outcome.failed() => {
                error!(
                    lost = self.unflushed_occurrences(),
                    "final flush failed; buffered errors were not persisted"
                );
            }
            Ok(outcome) => info!(persisted = outcome.persisted, "error tracker stopped"),
            Err(_) => {
                error!(
                    lost = self.unflushed_occurrences(),
                    "final flush timed out; unflushed errors may be lost"
                );
            }
        }
    }

    /// Records an error occurrence and returns the id of its aggregate entry.
    ///
    /// The context is sanitised, missing category/severity are inferred, and
    /// the occurrence is counted in the buffer. Critical errors are flushed
    /// and alerted on before this returns, the alert bounded by the
    /// notify timeout; everything else waits for the next timer tick.
    pub async fn capture(&self, error: &CapturedError, context: ErrorContext, options: CaptureOptions) -> String {
        let context = sanitizer::sanitize_context(context);
        let category = options
            .category
            .unwrap_or_else(|| classifier::determine_category(error));
        let severity = options
            .severity
            .unwrap_or_else(|| classifier::determine_severity(error, category));
        let fingerprint = fingerprint::fingerprint(error, category);

        if self.config.echo_captures {
            debug!(
                %category,
                %severity,
                context = ?context,
                stack = error.stack.as_deref(),
                "[{}] {}",
                category.as_str().to_uppercase(),
                error.message
            );
        }

        let occurrence = Occurrence {
            name: error.name.clone(),
            message: error.message.clone(),
            stack: error.stack.clone(),
            category,
            severity,
            context,
            metadata: options.metadata,
            occurred_at: self.clock.now(),
        };

        if severity != Severity::Critical {
            return self.buffer.upsert(&fingerprint, occurrence);
        }

        let alert = self.buffer.upsert_snapshot(&fingerprint, occurrence);
        let id = alert.id.clone();
        let outcome = self.scheduler.flush_now().await;
        if outcome.failed() {
            warn!(id = %id, "critical error could not be persisted immediately; it stays buffered");
        }
        match tokio::time::timeout(self.config.notify_timeout, self.notifier.notify(&alert)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, id = %id, "critical alert notification failed"),
            Err(_) => warn!(id = %id, "critical alert notification timed out"),
        }
        id
    }

    /// Captures an error raised while serving a request, deriving the
    /// context from the request (sanitised like any other context).
    pub async fn capture_request(&self, error: &CapturedError, request: RequestInfo) -> String {
        let context = ErrorContext {
            request_id: request.header(REQUEST_ID_HEADER).map(str::to_owned),
            user_agent: request.header("user-agent").map(str::to_owned),
            url: request.url,
            method: request.method,
            headers: request.headers,
            body: request.body,
            query: request.query,
            ip: request.ip,
            user_id: request.user_id,
            ..ErrorContext::default()
        };
        self.capture(error, context, CaptureOptions::default()).await
    }

    /// Flushes the buffer now, waiting for any flush already in progress.
    pub async fn flush_now(&self) -> FlushOutcome {
        self.scheduler.flush_now().await
    }

    /// Occurrences not yet persisted: those buffered plus those in a flush
    /// still writing to the store.
    #[must_use]
    pub fn unflushed_occurrences(&self) -> u64 {
        self.buffer.pending_occurrences() + self.scheduler.in_flight_occurrences()
    }

    /// Number of fingerprints waiting for the next flush.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Lists persisted errors, latest first.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Infrastructure` if the store query fails.
    #[instrument(skip(self))]
    pub async fn list(&self, filter: &ErrorFilter) -> Result<ErrorPage, TrackerError> {
        let predicate = filter.store_filter();
        let (errors, total) = tokio::try_join!(
            self.gateway
                .find_many(&predicate, EntryOrder::MostRecent, filter.pagination()),
            self.gateway.count(&predicate),
        )?;

        Ok(ErrorPage {
            errors,
            total,
            page: filter.page(),
            total_pages: total.div_ceil(u64::from(filter.limit())),
        })
    }

    /// Dashboard statistics over persisted errors.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Infrastructure` if a store query fails.
    pub async fn stats(&self) -> Result<ErrorStats, TrackerError> {
        self.stats.stats().await
    }

    /// Marks the entry resolved. Returns `false` if it does not exist or the
    /// store failed.
    #[instrument(skip(self))]
    pub async fn resolve(&self, fingerprint: &str) -> bool {
        self.patch(fingerprint, EntryPatch::resolve(self.clock.now())).await
    }

    /// Clears the entry's resolution. Returns `false` if it does not exist or
    /// the store failed.
    #[instrument(skip(self))]
    pub async fn unresolve(&self, fingerprint: &str) -> bool {
        self.patch(fingerprint, EntryPatch::unresolve()).await
    }

    async fn patch(&self, fingerprint: &str, patch: EntryPatch) -> bool {
        match self.gateway.update(fingerprint, &patch).await {
            Ok(found) => found,
            Err(err) => {
                warn!(error = %err, "failed to update error entry");
                false
            }
        }
    }

    /// Deletes resolved entries whose resolution is older than
    /// `older_than_days`, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Infrastructure` if the delete fails.
    #[instrument(skip(self))]
    pub async fn cleanup(&self, older_than_days: u32) -> Result<u64, TrackerError> {
        let filter = RetentionFilter {
            resolved_before: self.clock.since(TimeDelta::days(i64::from(older_than_days))),
        };
        let deleted = self.gateway.delete_many(&filter).await?;
        info!(deleted, older_than_days, "purged resolved errors");
        Ok(deleted)
    }
}

/// Awaits `operation`; if it fails, captures the error and returns it
/// unchanged. The tracker never alters the outcome.
///
/// # Errors
///
/// Returns exactly the error produced by `operation`.
pub async fn with_error_tracking<T, E, F>(tracker: &ErrorTracker, context: ErrorContext, operation: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: std::error::Error,
{
    match operation.await {
        Ok(value) => Ok(value),
        Err(err) => {
            tracker
                .capture(&CapturedError::from_error(&err), context, CaptureOptions::default())
                .await;
            Err(err)
        }
    }
}
