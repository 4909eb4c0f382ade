//! Filters, pagination and the read-side views served to operators.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::{Category, ErrorEntry, Severity};

/// Default page size for `list`.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Operator-supplied filter for listing errors. Pages are 1-based.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFilter {
    /// Only this category.
    pub category: Option<Category>,
    /// Only this severity.
    pub severity: Option<Severity>,
    /// Only resolved (`true`) or unresolved (`false`) entries.
    pub resolved: Option<bool>,
    /// Case-insensitive substring of the message.
    pub search: Option<String>,
    /// Page number, defaults to 1.
    pub page: Option<u32>,
    /// Page size, defaults to [`DEFAULT_PAGE_LIMIT`].
    pub limit: Option<u32>,
}

impl ErrorFilter {
    /// Effective page number (at least 1).
    #[must_use]
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// Effective page size (at least 1).
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1)
    }

    /// Row window for the effective page.
    #[must_use]
    pub fn pagination(&self) -> Pagination {
        Pagination {
            offset: u64::from(self.page() - 1) * u64::from(self.limit()),
            limit: self.limit(),
        }
    }

    /// The row predicate, without pagination.
    #[must_use]
    pub fn store_filter(&self) -> StoreFilter {
        StoreFilter {
            category: self.category,
            severity: self.severity,
            resolved: self.resolved,
            search: self.search.clone().filter(|s| !s.is_empty()),
            occurred_since: None,
        }
    }
}

/// Row predicate understood by the store. All set conditions must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreFilter {
    /// Only this category.
    pub category: Option<Category>,
    /// Only this severity.
    pub severity: Option<Severity>,
    /// Only this resolution state.
    pub resolved: Option<bool>,
    /// Case-insensitive substring of the message.
    pub search: Option<String>,
    /// Only entries whose latest occurrence is at or after this instant.
    pub occurred_since: Option<DateTime<Utc>>,
}

impl StoreFilter {
    /// Matches unresolved entries.
    #[must_use]
    pub fn unresolved() -> Self {
        Self {
            resolved: Some(false),
            ..Self::default()
        }
    }

    /// Matches entries seen at or after `since`.
    #[must_use]
    pub fn occurred_since(since: DateTime<Utc>) -> Self {
        Self {
            occurred_since: Some(since),
            ..Self::default()
        }
    }

    /// Evaluates the predicate in memory.
    #[must_use]
    pub fn matches(&self, entry: &ErrorEntry) -> bool {
        self.category.is_none_or(|c| entry.category == c)
            && self.severity.is_none_or(|s| entry.severity == s)
            && self.resolved.is_none_or(|r| entry.resolved == r)
            && self.search.as_deref().is_none_or(|needle| {
                entry
                    .message
                    .to_lowercase()
                    .contains(&needle.to_lowercase())
            })
            && self.occurred_since.is_none_or(|since| entry.occurred_at >= since)
    }
}

/// Row window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Rows to skip.
    pub offset: u64,
    /// Maximum rows to return.
    pub limit: u32,
}

impl Pagination {
    /// The first `limit` rows.
    #[must_use]
    pub const fn first(limit: u32) -> Self {
        Self { offset: 0, limit }
    }
}

/// Result ordering for `find_many`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOrder {
    /// Latest occurrence first.
    MostRecent,
    /// Highest count first, ties broken by latest occurrence.
    MostFrequent,
}

/// Column the store can group counts by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    /// Group by severity.
    Severity,
    /// Group by category.
    Category,
}

impl GroupField {
    /// Column name in the store.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            GroupField::Severity => "severity",
            GroupField::Category => "category",
        }
    }
}

/// Partial update applied by `resolve`/`unresolve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPatch {
    /// New resolution state.
    pub resolved: bool,
    /// New resolution timestamp.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl EntryPatch {
    /// Marks an entry resolved at `at`.
    #[must_use]
    pub const fn resolve(at: DateTime<Utc>) -> Self {
        Self {
            resolved: true,
            resolved_at: Some(at),
        }
    }

    /// Clears the resolution.
    #[must_use]
    pub const fn unresolve() -> Self {
        Self {
            resolved: false,
            resolved_at: None,
        }
    }
}

/// Retention predicate: resolved entries resolved strictly before a cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionFilter {
    /// Entries resolved before this instant are purged.
    pub resolved_before: DateTime<Utc>,
}

impl RetentionFilter {
    /// Evaluates the predicate in memory.
    #[must_use]
    pub fn matches(&self, entry: &ErrorEntry) -> bool {
        entry.resolved && entry.resolved_at.is_some_and(|at| at < self.resolved_before)
    }
}

/// One page of `list` results.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPage {
    /// Entries on this page, latest first.
    pub errors: Vec<ErrorEntry>,
    /// Entries matching the filter across all pages.
    pub total: u64,
    /// Page number.
    pub page: u32,
    /// Number of pages at the requested size.
    pub total_pages: u64,
}

/// A frequently occurring unresolved error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopError {
    /// Grouping key.
    pub fingerprint: String,
    /// Latest message.
    pub message: String,
    /// Total occurrences.
    pub count: u64,
    /// Latest occurrence.
    pub last_occurred: DateTime<Utc>,
}

impl From<ErrorEntry> for TopError {
    fn from(entry: ErrorEntry) -> Self {
        Self {
            fingerprint: entry.fingerprint,
            message: entry.message,
            count: entry.count,
            last_occurred: entry.occurred_at,
        }
    }
}

/// Operator dashboard summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorStats {
    /// All stored entries.
    pub total: u64,
    /// Entries not marked resolved.
    pub unresolved: u64,
    /// Entry counts per severity.
    pub by_severity: BTreeMap<Severity, u64>,
    /// Entry counts per category.
    pub by_category: BTreeMap<Category, u64>,
    /// Entries seen in the last 24 hours.
    pub last_24h: u64,
    /// Most frequent unresolved entries.
    pub top_errors: Vec<TopError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ErrorContext;
    use chrono::TimeZone;

    fn entry_with(message: &str, resolved: bool) -> ErrorEntry {
        ErrorEntry {
            id: "err_1".to_owned(),
            name: "Error".to_owned(),
            message: message.to_owned(),
            stack: None,
            category: Category::Database,
            severity: Severity::High,
            context: ErrorContext::default(),
            fingerprint: "fp".to_owned(),
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
            resolved,
            resolved_at: None,
            count: 1,
            metadata: None,
        }
    }

    #[test]
    fn test_defaults_to_first_page_of_twenty() {
        let filter = ErrorFilter::default();

        assert_eq!(filter.page(), 1);
        assert_eq!(filter.limit(), 20);
        assert_eq!(filter.pagination(), Pagination { offset: 0, limit: 20 });
    }

    #[test]
    fn test_zero_page_and_limit_are_clamped() {
        let filter = ErrorFilter {
            page: Some(0),
            limit: Some(0),
            ..ErrorFilter::default()
        };

        assert_eq!(filter.pagination(), Pagination { offset: 0, limit: 1 });
    }

    #[test]
    fn test_pagination_offset_for_later_page() {
        let filter = ErrorFilter {
            page: Some(3),
            limit: Some(10),
            ..ErrorFilter::default()
        };

        assert_eq!(filter.pagination().offset, 20);
    }

    #[test]
    fn test_search_matches_case_insensitively() {
        let filter = StoreFilter {
            search: Some("DEADLOCK".to_owned()),
            ..StoreFilter::default()
        };

        assert!(filter.matches(&entry_with("deadlock detected", false)));
        assert!(!filter.matches(&entry_with("timeout", false)));
    }

    #[test]
    fn test_empty_search_is_ignored() {
        let filter = ErrorFilter {
            search: Some(String::new()),
            ..ErrorFilter::default()
        };

        assert_eq!(filter.store_filter().search, None);
    }

    #[test]
    fn test_retention_requires_resolved_before_cutoff() {
        let cutoff = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        let retention = RetentionFilter {
            resolved_before: cutoff,
        };
        let mut old = entry_with("x", true);
        old.resolved_at = Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        let mut recent = entry_with("x", true);
        recent.resolved_at = Some(Utc.with_ymd_and_hms(2026, 1, 12, 0, 0, 0).unwrap());
        let mut unresolved = entry_with("x", false);
        unresolved.resolved_at = Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());

        assert!(retention.matches(&old));
        assert!(!retention.matches(&recent));
        assert!(!retention.matches(&unresolved));
    }

    #[test]
    fn test_stats_serialise_enum_keys_as_lowercase() {
        let stats = ErrorStats {
            total: 1,
            unresolved: 1,
            by_severity: BTreeMap::from([(Severity::Critical, 1)]),
            by_category: BTreeMap::from([(Category::Database, 1)]),
            last_24h: 1,
            top_errors: Vec::new(),
        };

        let json = serde_json::to_value(&stats).unwrap();

        assert_eq!(json["by_severity"]["critical"], 1);
        assert_eq!(json["by_category"]["database"], 1);
    }
}
