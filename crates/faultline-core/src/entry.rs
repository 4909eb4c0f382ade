//! The aggregate error record and its classification enums.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::ErrorContext;
use crate::error::TrackerError;

/// Broad origin of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Generic runtime failure.
    Runtime,
    /// Database or ORM failure.
    Database,
    /// Network failure.
    Network,
    /// Authentication or authorisation failure.
    Auth,
    /// Invalid input.
    Validation,
    /// Payment provider failure.
    Payment,
    /// Third-party API failure.
    External,
    /// Not classified.
    Unknown,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Category; 8] = [
        Category::Runtime,
        Category::Database,
        Category::Network,
        Category::Auth,
        Category::Validation,
        Category::Payment,
        Category::External,
        Category::Unknown,
    ];

    /// Returns the lowercase storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Category::Runtime => "runtime",
            Category::Database => "database",
            Category::Network => "network",
            Category::Auth => "auth",
            Category::Validation => "validation",
            Category::Payment => "payment",
            Category::External => "external",
            Category::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| TrackerError::Validation(format!("unknown category: {s}")))
    }
}

/// How urgently an error needs attention. Ordered from `Low` to `Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Expected noise, e.g. invalid input.
    Low,
    /// Default severity.
    Medium,
    /// Degraded functionality.
    High,
    /// Flushed and alerted on immediately.
    Critical,
}

impl Severity {
    /// Every severity, lowest first.
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// Returns the lowercase storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|severity| severity.as_str() == s)
            .ok_or_else(|| TrackerError::Validation(format!("unknown severity: {s}")))
    }
}

/// The tracker's view of an application error: its type name, message and
/// a newline-delimited trace whose second line is the call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedError {
    /// Error type name, e.g. `"TimeoutError"`.
    pub name: String,
    /// Human-readable message.
    pub message: String,
    /// Trace text, first line is the error itself.
    pub stack: Option<String>,
}

impl CapturedError {
    /// Creates a captured error without a trace.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// Attaches a trace.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Captures a Rust error value.
    ///
    /// The name is the unqualified type name of `E`. The trace is the error
    /// line followed by one `at` line per cause in the `source()` chain, so
    /// the immediate cause acts as the call site.
    #[must_use]
    pub fn from_error<E: std::error::Error>(error: &E) -> Self {
        let name = short_type_name(std::any::type_name::<E>()).to_owned();
        let message = error.to_string();

        let mut stack = format!("{name}: {message}");
        let mut source = error.source();
        while let Some(cause) = source {
            stack.push_str("\n    at ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }

        Self {
            name,
            message,
            stack: Some(stack),
        }
    }

    /// Returns the trimmed second line of the trace, or `""` when there is
    /// no such line.
    #[must_use]
    pub fn call_site(&self) -> &str {
        self.stack
            .as_deref()
            .and_then(|stack| stack.lines().nth(1))
            .map_or("", str::trim)
    }
}

fn short_type_name(full: &str) -> &str {
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}

/// Generates a fresh opaque entry identifier.
#[must_use]
pub fn new_entry_id() -> String {
    format!("err_{}", Uuid::now_v7().simple())
}

/// Aggregate record for every occurrence sharing one fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Identifier assigned at first occurrence.
    pub id: String,
    /// Error type name.
    pub name: String,
    /// Message of the most recent occurrence.
    pub message: String,
    /// Trace of the most recent occurrence.
    pub stack: Option<String>,
    /// Category fixed at first occurrence.
    pub category: Category,
    /// Severity fixed at first occurrence.
    pub severity: Severity,
    /// Shallow merge of every occurrence's context.
    pub context: ErrorContext,
    /// Grouping key; the entry's identity.
    pub fingerprint: String,
    /// Timestamp of the most recent occurrence.
    pub occurred_at: DateTime<Utc>,
    /// Set only by an operator.
    pub resolved: bool,
    /// When the entry was last resolved.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Total occurrences. Only ever incremented.
    pub count: u64,
    /// Caller-supplied data, last write wins.
    pub metadata: Option<serde_json::Value>,
}

impl ErrorEntry {
    /// Folds a later aggregate for the same fingerprint into this one:
    /// counts add, narrative fields and `occurred_at` take the later values,
    /// contexts merge with the later keys winning.
    pub fn absorb(&mut self, later: ErrorEntry) {
        debug_assert_eq!(self.fingerprint, later.fingerprint);
        self.count += later.count;
        self.message = later.message;
        self.stack = later.stack;
        self.occurred_at = later.occurred_at;
        self.context.merge(later.context);
        if later.metadata.is_some() {
            self.metadata = later.metadata;
        }
    }
}
