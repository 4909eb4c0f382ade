//! `PostgreSQL` implementation of the `PersistenceGateway` trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::debug;

use faultline_core::context::ErrorContext;
use faultline_core::entry::ErrorEntry;
use faultline_core::error::TrackerError;
use faultline_core::gateway::PersistenceGateway;
use faultline_core::query::{EntryOrder, EntryPatch, GroupField, Pagination, RetentionFilter, StoreFilter};

const SELECT_COLUMNS: &str = "SELECT id, name, message, stack, category, severity, context, \
     fingerprint, occurred_at, resolved, resolved_at, count, metadata FROM error_logs";

const UPSERT_INCREMENT: &str = r"
INSERT INTO error_logs (
    id, name, message, stack, category, severity, context,
    fingerprint, occurred_at, resolved, resolved_at, count, metadata
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE, NULL, $10, $11)
ON CONFLICT (fingerprint) DO UPDATE SET
    count       = error_logs.count + EXCLUDED.count,
    occurred_at = EXCLUDED.occurred_at,
    message     = EXCLUDED.message,
    stack       = EXCLUDED.stack,
    context     = error_logs.context || EXCLUDED.context,
    metadata    = COALESCE(EXCLUDED.metadata, error_logs.metadata)
";

/// PostgreSQL-backed error store. One row per fingerprint in `error_logs`.
#[derive(Debug, Clone)]
pub struct PgErrorStore {
    pool: PgPool,
}

impl PgErrorStore {
    /// Creates a new `PgErrorStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ErrorLogRow {
    id: String,
    name: String,
    message: String,
    stack: Option<String>,
    category: String,
    severity: String,
    context: Json<ErrorContext>,
    fingerprint: String,
    occurred_at: DateTime<Utc>,
    resolved: bool,
    resolved_at: Option<DateTime<Utc>>,
    count: i64,
    metadata: Option<serde_json::Value>,
}

impl TryFrom<ErrorLogRow> for ErrorEntry {
    type Error = TrackerError;

    fn try_from(row: ErrorLogRow) -> Result<Self, Self::Error> {
        Ok(ErrorEntry {
            id: row.id,
            name: row.name,
            message: row.message,
            stack: row.stack,
            category: row.category.parse()?,
            severity: row.severity.parse()?,
            context: row.context.0,
            fingerprint: row.fingerprint,
            occurred_at: row.occurred_at,
            resolved: row.resolved,
            resolved_at: row.resolved_at,
            count: to_u64(row.count)?,
            metadata: row.metadata,
        })
    }
}

fn infrastructure(err: sqlx::Error) -> TrackerError {
    TrackerError::Infrastructure(err.to_string())
}

fn to_u64(value: i64) -> Result<u64, TrackerError> {
    u64::try_from(value)
        .map_err(|_| TrackerError::Infrastructure(format!("negative count in store: {value}")))
}

fn to_i64(value: u64) -> Result<i64, TrackerError> {
    i64::try_from(value)
        .map_err(|_| TrackerError::Validation(format!("value out of range for store: {value}")))
}

/// Escapes `LIKE` wildcards so the search term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &StoreFilter) {
    builder.push(" WHERE TRUE");
    if let Some(category) = filter.category {
        builder.push(" AND category = ").push_bind(category.as_str());
    }
    if let Some(severity) = filter.severity {
        builder.push(" AND severity = ").push_bind(severity.as_str());
    }
    if let Some(resolved) = filter.resolved {
        builder.push(" AND resolved = ").push_bind(resolved);
    }
    if let Some(search) = &filter.search {
        builder
            .push(" AND message ILIKE ")
            .push_bind(format!("%{}%", escape_like(search)));
    }
    if let Some(since) = filter.occurred_since {
        builder.push(" AND occurred_at >= ").push_bind(since);
    }
}

#[async_trait]
impl PersistenceGateway for PgErrorStore {
    async fn upsert_increment(&self, entry: &ErrorEntry) -> Result<(), TrackerError> {
        sqlx::query(UPSERT_INCREMENT)
            .bind(&entry.id)
            .bind(&entry.name)
            .bind(&entry.message)
            .bind(entry.stack.as_deref())
            .bind(entry.category.as_str())
            .bind(entry.severity.as_str())
            .bind(Json(&entry.context))
            .bind(&entry.fingerprint)
            .bind(entry.occurred_at)
            .bind(to_i64(entry.count)?)
            .bind(entry.metadata.as_ref())
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;

        debug!(fingerprint = %entry.fingerprint, count = entry.count, "upserted error entry");
        Ok(())
    }

    async fn find_many(
        &self,
        filter: &StoreFilter,
        order: EntryOrder,
        page: Pagination,
    ) -> Result<Vec<ErrorEntry>, TrackerError> {
        let mut builder = QueryBuilder::<Postgres>::new(SELECT_COLUMNS);
        push_filter(&mut builder, filter);
        builder.push(match order {
            EntryOrder::MostRecent => " ORDER BY occurred_at DESC, id",
            EntryOrder::MostFrequent => " ORDER BY count DESC, occurred_at DESC",
        });
        builder.push(" LIMIT ").push_bind(i64::from(page.limit));
        builder.push(" OFFSET ").push_bind(to_i64(page.offset)?);

        let rows = builder
            .build_query_as::<ErrorLogRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;

        rows.into_iter().map(ErrorEntry::try_from).collect()
    }

    async fn count(&self, filter: &StoreFilter) -> Result<u64, TrackerError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM error_logs");
        push_filter(&mut builder, filter);

        let total: i64 = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(infrastructure)?;

        to_u64(total)
    }

    async fn group_by(&self, field: GroupField) -> Result<BTreeMap<String, u64>, TrackerError> {
        let column = field.column();
        let sql = format!("SELECT {column}, COUNT(*) FROM error_logs GROUP BY {column}");

        let rows: Vec<(String, i64)> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;

        rows.into_iter()
            .map(|(value, total)| Ok((value, to_u64(total)?)))
            .collect()
    }

    async fn update(&self, fingerprint: &str, patch: &EntryPatch) -> Result<bool, TrackerError> {
        let result = sqlx::query(
            "UPDATE error_logs SET resolved = $1, resolved_at = $2 WHERE fingerprint = $3",
        )
        .bind(patch.resolved)
        .bind(patch.resolved_at)
        .bind(fingerprint)
        .execute(&self.pool)
        .await
        .map_err(infrastructure)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, filter: &RetentionFilter) -> Result<u64, TrackerError> {
        let result = sqlx::query(
            "DELETE FROM error_logs WHERE resolved = TRUE AND resolved_at < $1",
        )
        .bind(filter.resolved_before)
        .execute(&self.pool)
        .await
        .map_err(infrastructure)?;

        Ok(result.rows_affected())
    }
}
