//! Grouping keys for captured errors.
//!
//! Two occurrences share a fingerprint when they agree on category, error
//! name, the first 100 characters of the message and the call site (the
//! trimmed second trace line). Long messages differing only past the prefix
//! therefore group together.

use faultline_core::entry::{Category, CapturedError};
use sha2::{Digest, Sha256};

/// Length of a stored fingerprint.
pub const FINGERPRINT_LEN: usize = 64;

/// Number of message characters that take part in grouping.
pub const MESSAGE_PREFIX_CHARS: usize = 100;

/// Computes the fingerprint of `error` under `category`.
#[must_use]
pub fn fingerprint(error: &CapturedError, category: Category) -> String {
    let prefix: String = error.message.chars().take(MESSAGE_PREFIX_CHARS).collect();
    let key = format!(
        "{category}:{name}:{prefix}:{call_site}",
        name = error.name,
        call_site = error.call_site(),
    );

    let mut digest = format!("{:x}", Sha256::digest(key.as_bytes()));
    digest.truncate(FINGERPRINT_LEN);
    digest
}
