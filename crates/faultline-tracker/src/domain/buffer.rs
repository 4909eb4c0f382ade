//! In-memory dedup buffer keyed by fingerprint.
//!
//! A single mutex guards the whole map. `drain` swaps the map out under that
//! lock, so an `upsert` racing with a drain lands either in the drained
//! batch or in the fresh map, never in neither.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use faultline_core::context::ErrorContext;
use faultline_core::entry::{Category, ErrorEntry, Severity, new_entry_id};

/// One observed occurrence of an error, already sanitised and classified.
#[derive(Debug, Clone)]
pub struct Occurrence {
    /// Error type name.
    pub name: String,
    /// Message.
    pub message: String,
    /// Trace.
    pub stack: Option<String>,
    /// Category.
    pub category: Category,
    /// Severity.
    pub severity: Severity,
    /// Sanitised context.
    pub context: ErrorContext,
    /// Caller-supplied metadata.
    pub metadata: Option<serde_json::Value>,
    /// When the occurrence was captured.
    pub occurred_at: DateTime<Utc>,
}

impl Occurrence {
    /// Builds a single-occurrence entry.
    #[must_use]
    pub fn into_entry(self, id: String, fingerprint: String) -> ErrorEntry {
        ErrorEntry {
            id,
            name: self.name,
            message: self.message,
            stack: self.stack,
            category: self.category,
            severity: self.severity,
            context: self.context,
            fingerprint,
            occurred_at: self.occurred_at,
            resolved: false,
            resolved_at: None,
            count: 1,
            metadata: self.metadata,
        }
    }
}

/// Concurrency-safe map from fingerprint to a partial-period aggregate.
#[derive(Debug, Default)]
pub struct DedupBuffer {
    entries: Mutex<HashMap<String, ErrorEntry>>,
}

impl DedupBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ErrorEntry>> {
        // The map is valid after any panic mid-update, so keep using it.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records an occurrence and returns the id of the entry it landed in.
    ///
    /// A resident entry gets `count + 1`, the occurrence's timestamp,
    /// message and trace, and a shallow merge of its context. Otherwise a
    /// new entry with `count = 1` and a fresh id is inserted.
    pub fn upsert(&self, fingerprint: &str, occurrence: Occurrence) -> String {
        self.record(fingerprint, occurrence, |entry| entry.id.clone())
    }

    /// Like [`upsert`](Self::upsert), but returns a copy of the merged
    /// entry as it stands after this occurrence.
    pub fn upsert_snapshot(&self, fingerprint: &str, occurrence: Occurrence) -> ErrorEntry {
        self.record(fingerprint, occurrence, ErrorEntry::clone)
    }

    fn record<T>(&self, fingerprint: &str, occurrence: Occurrence, read: impl FnOnce(&ErrorEntry) -> T) -> T {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(fingerprint) {
            entry.count += 1;
            entry.occurred_at = occurrence.occurred_at;
            entry.message = occurrence.message;
            entry.stack = occurrence.stack;
            entry.context.merge(occurrence.context);
            if occurrence.metadata.is_some() {
                entry.metadata = occurrence.metadata;
            }
            return read(entry);
        }

        let entry = occurrence.into_entry(new_entry_id(), fingerprint.to_owned());
        let value = read(&entry);
        entries.insert(fingerprint.to_owned(), entry);
        value
    }

    /// Removes and returns every buffered entry.
    pub fn drain(&self) -> Vec<ErrorEntry> {
        let drained = std::mem::take(&mut *self.lock());
        drained.into_values().collect()
    }

    /// Merges entries from a failed flush back into the buffer.
    ///
    /// An entry whose fingerprint was captured again since the drain is
    /// combined with the resident one: counts add, the resident (newer)
    /// narrative fields win, and the requeued id is kept.
    pub fn requeue(&self, failed: Vec<ErrorEntry>) {
        let mut entries = self.lock();
        for mut entry in failed {
            if let Some(resident) = entries.remove(&entry.fingerprint) {
                entry.absorb(resident);
            }
            entries.insert(entry.fingerprint.clone(), entry);
        }
    }

    /// Number of buffered fingerprints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sum of buffered occurrence counts.
    #[must_use]
    pub fn pending_occurrences(&self) -> u64 {
        self.lock().values().map(|entry| entry.count).sum()
    }
}
