//! Shared error-tracking abstractions for Faultline.
//!
//! This crate defines the aggregate error record, the query types used by
//! operators, and the traits for the durable store and the critical alert
//! channel. It contains no infrastructure code.

pub mod clock;
pub mod context;
pub mod entry;
pub mod error;
pub mod gateway;
pub mod notifier;
pub mod query;
