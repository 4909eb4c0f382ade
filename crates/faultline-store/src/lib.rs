//! `PostgreSQL` persistence for aggregated error entries.

pub mod pg_error_store;

pub use pg_error_store::PgErrorStore;
