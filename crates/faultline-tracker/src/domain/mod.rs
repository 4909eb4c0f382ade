//! Pure capture-path logic and the shared dedup buffer.

pub mod buffer;
pub mod classifier;
pub mod fingerprint;
pub mod sanitizer;
