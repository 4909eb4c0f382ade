//! Mock `PersistenceGateway` implementations for tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use faultline_core::entry::ErrorEntry;
use faultline_core::error::TrackerError;
use faultline_core::gateway::PersistenceGateway;
use faultline_core::query::{EntryOrder, EntryPatch, GroupField, Pagination, RetentionFilter, StoreFilter};

/// An in-memory store with the same upsert-increment semantics as the
/// Postgres store. Keyed by fingerprint.
#[derive(Debug, Default)]
pub struct InMemoryErrorStore {
    rows: Mutex<BTreeMap<String, ErrorEntry>>,
    upsert_calls: AtomicUsize,
}

impl InMemoryErrorStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `entries`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn with_entries(entries: Vec<ErrorEntry>) -> Self {
        let store = Self::new();
        {
            let mut rows = store.rows.lock().unwrap();
            for entry in entries {
                rows.insert(entry.fingerprint.clone(), entry);
            }
        }
        store
    }

    /// Returns the stored entry for `fingerprint`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn get(&self, fingerprint: &str) -> Option<ErrorEntry> {
        self.rows.lock().unwrap().get(fingerprint).cloned()
    }

    /// Returns a snapshot of every stored entry, ordered by fingerprint.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn entries(&self) -> Vec<ErrorEntry> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    /// Number of `upsert_increment` calls received.
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryErrorStore {
    async fn upsert_increment(&self, entry: &ErrorEntry) -> Result<(), TrackerError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&entry.fingerprint) {
            Some(row) => {
                row.count += entry.count;
                row.occurred_at = entry.occurred_at;
                row.message.clone_from(&entry.message);
                row.stack.clone_from(&entry.stack);
                row.context.merge(entry.context.clone());
                if entry.metadata.is_some() {
                    row.metadata.clone_from(&entry.metadata);
                }
            }
            None => {
                let mut row = entry.clone();
                row.resolved = false;
                row.resolved_at = None;
                rows.insert(entry.fingerprint.clone(), row);
            }
        }
        Ok(())
    }

    async fn find_many(
        &self,
        filter: &StoreFilter,
        order: EntryOrder,
        page: Pagination,
    ) -> Result<Vec<ErrorEntry>, TrackerError> {
        let mut matching: Vec<ErrorEntry> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        match order {
            EntryOrder::MostRecent => matching.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at)),
            EntryOrder::MostFrequent => matching.sort_by(|a, b| {
                b.count
                    .cmp(&a.count)
                    .then_with(|| b.occurred_at.cmp(&a.occurred_at))
            }),
        }
        let offset = usize::try_from(page.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self, filter: &StoreFilter) -> Result<u64, TrackerError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.values().filter(|entry| filter.matches(entry)).count() as u64)
    }

    async fn group_by(&self, field: GroupField) -> Result<BTreeMap<String, u64>, TrackerError> {
        let rows = self.rows.lock().unwrap();
        let mut groups = BTreeMap::new();
        for entry in rows.values() {
            let key = match field {
                GroupField::Severity => entry.severity.as_str(),
                GroupField::Category => entry.category.as_str(),
            };
            *groups.entry(key.to_owned()).or_insert(0) += 1;
        }
        Ok(groups)
    }

    async fn update(&self, fingerprint: &str, patch: &EntryPatch) -> Result<bool, TrackerError> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows.get_mut(fingerprint).is_some_and(|row| {
            row.resolved = patch.resolved;
            row.resolved_at = patch.resolved_at;
            true
        }))
    }

    async fn delete_many(&self, filter: &RetentionFilter) -> Result<u64, TrackerError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|_, entry| !filter.matches(entry));
        Ok((before - rows.len()) as u64)
    }
}

/// A store whose database is always unreachable.
#[derive(Debug)]
pub struct FailingErrorStore;

fn unreachable_store<T>() -> Result<T, TrackerError> {
    Err(TrackerError::Infrastructure("connection refused".into()))
}

#[async_trait]
impl PersistenceGateway for FailingErrorStore {
    async fn upsert_increment(&self, _entry: &ErrorEntry) -> Result<(), TrackerError> {
        unreachable_store()
    }

    async fn find_many(
        &self,
        _filter: &StoreFilter,
        _order: EntryOrder,
        _page: Pagination,
    ) -> Result<Vec<ErrorEntry>, TrackerError> {
        unreachable_store()
    }

    async fn count(&self, _filter: &StoreFilter) -> Result<u64, TrackerError> {
        unreachable_store()
    }

    async fn group_by(&self, _field: GroupField) -> Result<BTreeMap<String, u64>, TrackerError> {
        unreachable_store()
    }

    async fn update(&self, _fingerprint: &str, _patch: &EntryPatch) -> Result<bool, TrackerError> {
        unreachable_store()
    }

    async fn delete_many(&self, _filter: &RetentionFilter) -> Result<u64, TrackerError> {
        unreachable_store()
    }
}

/// An in-memory store whose upserts follow a script. Each
/// `upsert_increment` consumes the next outcome: `true` persists, `false`
/// fails. Once the script is exhausted every upsert persists. Reads always
/// succeed.
#[derive(Debug)]
pub struct FlakyErrorStore {
    inner: InMemoryErrorStore,
    script: Mutex<VecDeque<bool>>,
}

impl FlakyErrorStore {
    /// Creates a store following `script`.
    #[must_use]
    pub fn new(script: Vec<bool>) -> Self {
        Self {
            inner: InMemoryErrorStore::new(),
            script: Mutex::new(script.into()),
        }
    }

    /// The backing store holding whatever was persisted.
    pub fn inner(&self) -> &InMemoryErrorStore {
        &self.inner
    }
}

#[async_trait]
impl PersistenceGateway for FlakyErrorStore {
    async fn upsert_increment(&self, entry: &ErrorEntry) -> Result<(), TrackerError> {
        let persist = self.script.lock().unwrap().pop_front().unwrap_or(true);
        if !persist {
            return unreachable_store();
        }
        self.inner.upsert_increment(entry).await
    }

    async fn find_many(
        &self,
        filter: &StoreFilter,
        order: EntryOrder,
        page: Pagination,
    ) -> Result<Vec<ErrorEntry>, TrackerError> {
        self.inner.find_many(filter, order, page).await
    }

    async fn count(&self, filter: &StoreFilter) -> Result<u64, TrackerError> {
        self.inner.count(filter).await
    }

    async fn group_by(&self, field: GroupField) -> Result<BTreeMap<String, u64>, TrackerError> {
        self.inner.group_by(field).await
    }

    async fn update(&self, fingerprint: &str, patch: &EntryPatch) -> Result<bool, TrackerError> {
        self.inner.update(fingerprint, patch).await
    }

    async fn delete_many(&self, filter: &RetentionFilter) -> Result<u64, TrackerError> {
        self.inner.delete_many(filter).await
    }
}

/// An in-memory store whose upserts take `latency` and which records the
/// highest number of upserts ever in flight at once.
#[derive(Debug)]
pub struct SlowErrorStore {
    inner: InMemoryErrorStore,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowErrorStore {
    /// Creates a store delaying each upsert by `latency`.
    #[must_use]
    pub fn new(latency: Duration) -> Self {
        Self {
            inner: InMemoryErrorStore::new(),
            latency,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// The backing store holding whatever was persisted.
    pub fn inner(&self) -> &InMemoryErrorStore {
        &self.inner
    }

    /// Highest observed number of concurrent upserts.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceGateway for SlowErrorStore {
    async fn upsert_increment(&self, entry: &ErrorEntry) -> Result<(), TrackerError> {
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        let result = self.inner.upsert_increment(entry).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn find_many(
        &self,
        filter: &StoreFilter,
        order: EntryOrder,
        page: Pagination,
    ) -> Result<Vec<ErrorEntry>, TrackerError> {
        self.inner.find_many(filter, order, page).await
    }

    async fn count(&self, filter: &StoreFilter) -> Result<u64, TrackerError> {
        self.inner.count(filter).await
    }

    async fn group_by(&self, field: GroupField) -> Result<BTreeMap<String, u64>, TrackerError> {
        self.inner.group_by(field).await
    }

    async fn update(&self, fingerprint: &str, patch: &EntryPatch) -> Result<bool, TrackerError> {
        self.inner.update(fingerprint, patch).await
    }

    async fn delete_many(&self, filter: &RetentionFilter) -> Result<u64, TrackerError> {
        self.inner.delete_many(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};
    use faultline_core::context::ErrorContext;
    use faultline_core::entry::{Category, Severity};

    fn entry(count: u64, message: &str) -> ErrorEntry {
        ErrorEntry {
            id: format!("err_{message}"),
            name: "Error".to_owned(),
            message: message.to_owned(),
            stack: None,
            category: Category::Runtime,
            severity: Severity::Medium,
            context: ErrorContext::default(),
            fingerprint: "fp".to_owned(),
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
            resolved: false,
            resolved_at: None,
            count,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_increment_adds_counts_and_keeps_first_id() {
        // Arrange
        let store = InMemoryErrorStore::new();

        // Act
        store.upsert_increment(&entry(3, "first")).await.unwrap();
        store.upsert_increment(&entry(4, "second")).await.unwrap();

        // Assert
        let stored = store.get("fp").unwrap();
        assert_eq!(stored.count, 7);
        assert_eq!(stored.id, "err_first");
        assert_eq!(stored.message, "second");
        assert_eq!(store.upsert_calls(), 2);
    }

    #[tokio::test]
    async fn test_upsert_increment_preserves_resolution() {
        let mut resolved = entry(1, "first");
        resolved.resolved = true;
        let store = InMemoryErrorStore::with_entries(vec![resolved]);

        store.upsert_increment(&entry(1, "again")).await.unwrap();

        assert!(store.get("fp").unwrap().resolved);
    }

    #[tokio::test]
    async fn test_flaky_store_follows_script() {
        let store = FlakyErrorStore::new(vec![false, true]);

        assert!(store.upsert_increment(&entry(1, "a")).await.is_err());
        assert!(store.upsert_increment(&entry(1, "a")).await.is_ok());
        assert!(store.upsert_increment(&entry(1, "a")).await.is_ok());
        assert_eq!(store.inner().get("fp").unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_update_reports_missing_rows() {
        let store = InMemoryErrorStore::new();

        let found = store.update("missing", &EntryPatch::unresolve()).await.unwrap();

        assert!(!found);
        assert_eq!(serde_json::to_value(store.entries()).unwrap(), serde_json::json!([]));
    }
}
