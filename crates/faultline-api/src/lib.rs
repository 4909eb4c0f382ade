//! Faultline API: HTTP surface for remote capture and operator queries.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;
