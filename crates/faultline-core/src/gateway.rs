//! Durable store abstraction.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::entry::ErrorEntry;
use crate::error::TrackerError;
use crate::query::{EntryOrder, EntryPatch, GroupField, Pagination, RetentionFilter, StoreFilter};

/// The narrow contract the tracker needs from durable storage.
///
/// The store must hold exactly one row per fingerprint.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Inserts `entry`, or merges it into the existing row with the same
    /// fingerprint: `count` is **added** to the stored count, `occurred_at`,
    /// `message` and `stack` are overwritten, the stored context is
    /// shallow-merged with `entry.context`, and `metadata` is replaced when
    /// set. Resolution state, category, severity and id are left untouched.
    async fn upsert_increment(&self, entry: &ErrorEntry) -> Result<(), TrackerError>;

    /// Returns one window of entries matching `filter`.
    async fn find_many(
        &self,
        filter: &StoreFilter,
        order: EntryOrder,
        page: Pagination,
    ) -> Result<Vec<ErrorEntry>, TrackerError>;

    /// Counts entries matching `filter`.
    async fn count(&self, filter: &StoreFilter) -> Result<u64, TrackerError>;

    /// Counts entries per distinct value of `field`.
    async fn group_by(&self, field: GroupField) -> Result<BTreeMap<String, u64>, TrackerError>;

    /// Applies `patch` to the entry with `fingerprint`. Returns `false` when
    /// no such entry exists.
    async fn update(&self, fingerprint: &str, patch: &EntryPatch) -> Result<bool, TrackerError>;

    /// Deletes entries matching `filter` and returns how many were removed.
    async fn delete_many(&self, filter: &RetentionFilter) -> Result<u64, TrackerError>;
}
