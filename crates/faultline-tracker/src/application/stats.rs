//! Read-side summaries for the operator dashboard.
//!
//! Every call queries the store; buffered occurrences that have not been
//! flushed yet are not visible here.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::TimeDelta;
use faultline_core::clock::Clock;
use faultline_core::error::TrackerError;
use faultline_core::gateway::PersistenceGateway;
use faultline_core::query::{EntryOrder, ErrorStats, GroupField, Pagination, StoreFilter};
use tracing::warn;

/// Composes dashboard statistics from store queries.
pub struct StatsAggregator {
    gateway: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
    top_errors: u32,
}

impl StatsAggregator {
    /// Creates an aggregator returning up to `top_errors` top offenders.
    #[must_use]
    pub fn new(gateway: Arc<dyn PersistenceGateway>, clock: Arc<dyn Clock>, top_errors: u32) -> Self {
        Self {
            gateway,
            clock,
            top_errors,
        }
    }

    /// Computes totals, per-severity and per-category breakdowns, the
    /// 24-hour count and the most frequent unresolved errors.
    ///
    /// # Errors
    ///
    /// Returns the first store error encountered.
    pub async fn stats(&self) -> Result<ErrorStats, TrackerError> {
        let since = self.clock.since(TimeDelta::hours(24));
        let all = StoreFilter::default();
        let unresolved = StoreFilter::unresolved();
        let recent = StoreFilter::occurred_since(since);

        let (total, unresolved_count, by_severity, by_category, last_24h, top) = tokio::try_join!(
            self.gateway.count(&all),
            self.gateway.count(&unresolved),
            self.gateway.group_by(GroupField::Severity),
            self.gateway.group_by(GroupField::Category),
            self.gateway.count(&recent),
            self.gateway.find_many(
                &unresolved,
                EntryOrder::MostFrequent,
                Pagination::first(self.top_errors),
            ),
        )?;

        Ok(ErrorStats {
            total,
            unresolved: unresolved_count,
            by_severity: typed_groups(by_severity, GroupField::Severity),
            by_category: typed_groups(by_category, GroupField::Category),
            last_24h,
            top_errors: top.into_iter().map(Into::into).collect(),
        })
    }
}

fn typed_groups<K: FromStr + Ord>(groups: BTreeMap<String, u64>, field: GroupField) -> BTreeMap<K, u64> {
    groups
        .into_iter()
        .filter_map(|(value, count)| match value.parse::<K>() {
            Ok(key) => Some((key, count)),
            Err(_) => {
                warn!(field = field.column(), value = %value, "skipping unrecognised group value");
                None
            }
        })
        .collect()
}
