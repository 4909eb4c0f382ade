//! Keyword heuristics that infer category and severity when the caller did
//! not supply them.

use faultline_core::entry::{CapturedError, Category, Severity};

const DATABASE_KEYWORDS: [&str; 3] = ["prisma", "database", "sql"];
const NETWORK_KEYWORDS: [&str; 3] = ["fetch", "network", "econnrefused"];
const AUTH_KEYWORDS: [&str; 3] = ["auth", "unauthorized", "forbidden"];
const VALIDATION_MESSAGE_KEYWORDS: [&str; 2] = ["invalid", "required"];
const PAYMENT_KEYWORDS: [&str; 3] = ["payment", "stripe", "iyzico"];
const EXTERNAL_KEYWORDS: [&str; 2] = ["api", "external"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Infers the category. Rules are checked in a fixed priority order
/// (database, network, auth, validation, payment, external) because one
/// message can match several keyword sets.
#[must_use]
pub fn determine_category(error: &CapturedError) -> Category {
    let message = error.message.to_lowercase();
    let name = error.name.to_lowercase();

    if contains_any(&message, &DATABASE_KEYWORDS) {
        Category::Database
    } else if contains_any(&message, &NETWORK_KEYWORDS) {
        Category::Network
    } else if contains_any(&message, &AUTH_KEYWORDS) {
        Category::Auth
    } else if name.contains("validation") || contains_any(&message, &VALIDATION_MESSAGE_KEYWORDS) {
        Category::Validation
    } else if contains_any(&message, &PAYMENT_KEYWORDS) {
        Category::Payment
    } else if contains_any(&message, &EXTERNAL_KEYWORDS) {
        Category::External
    } else {
        Category::Runtime
    }
}

/// Infers the severity. First matching rule wins; message checks are
/// case-sensitive.
#[must_use]
pub fn determine_severity(error: &CapturedError, category: Category) -> Severity {
    let message = error.message.as_str();

    match category {
        Category::Database if message.contains("connection") => Severity::Critical,
        Category::Payment => Severity::High,
        _ if message.contains("ECONNREFUSED") || message.contains("timeout") => Severity::High,
        Category::Auth => Severity::Medium,
        Category::Validation => Severity::Low,
        _ => Severity::Medium,
    }
}
