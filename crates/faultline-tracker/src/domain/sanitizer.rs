//! Redaction of sensitive request data.
//!
//! Every context passes through here before it reaches the buffer, the
//! store or a log line.

use std::collections::BTreeMap;

use faultline_core::context::ErrorContext;
use serde_json::{Map, Value};

/// Replacement for redacted values.
pub const REDACTED: &str = "[REDACTED]";

/// Key fragments whose values are redacted wherever they appear, compared
/// case-insensitively.
pub const SENSITIVE_KEYS: [&str; 6] = ["password", "token", "secret", "apiKey", "creditCard", "cvv"];

/// Header names carrying credentials that no key fragment above catches.
pub const SENSITIVE_HEADERS: [&str; 4] = ["authorization", "proxy-authorization", "cookie", "set-cookie"];

/// Returns `true` if a key's value must be redacted.
#[must_use]
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_KEYS
        .iter()
        .any(|fragment| key.contains(&fragment.to_lowercase()))
}

/// Returns a copy of `body` with sensitive values redacted. Absent bodies
/// stay absent.
#[must_use]
pub fn sanitize(body: Option<&Value>) -> Option<Value> {
    body.map(sanitize_value)
}

/// Returns a copy of `value` with every sensitive key redacted, descending
/// into nested objects and arrays. Non-object scalars are returned as-is.
#[must_use]
pub fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sanitized: Map<String, Value> = map
                .iter()
                .map(|(key, inner)| {
                    let inner = if is_sensitive_key(key) {
                        Value::from(REDACTED)
                    } else {
                        sanitize_value(inner)
                    };
                    (key.clone(), inner)
                })
                .collect();
            Value::Object(sanitized)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        other => other.clone(),
    }
}

/// Returns a copy of `headers` with credential headers redacted.
#[must_use]
pub fn sanitize_headers(headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let credential = SENSITIVE_HEADERS
                .iter()
                .any(|header| name.eq_ignore_ascii_case(header));
            if credential || is_sensitive_key(name) {
                (name.clone(), REDACTED.to_owned())
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}

/// Redacts every free-form part of a context.
#[must_use]
pub fn sanitize_context(context: ErrorContext) -> ErrorContext {
    ErrorContext {
        params: sanitize(context.params.as_ref()),
        headers: context.headers.as_ref().map(sanitize_headers),
        body: sanitize(context.body.as_ref()),
        query: sanitize(context.query.as_ref()),
        extra: context
            .extra
            .into_iter()
            .map(|(key, value)| {
                if is_sensitive_key(&key) {
                    (key, Value::from(REDACTED))
                } else {
                    let value = sanitize_value(&value);
                    (key, value)
                }
            })
            .collect(),
        ..context
    }
}
