//! Services that orchestrate the domain pieces against the store.

pub mod notifier;
pub mod scheduler;
pub mod stats;
pub mod tracker;
