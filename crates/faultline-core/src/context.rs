//! Contextual attributes captured alongside an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attributes describing where an error happened.
///
/// Unset fields are omitted when serialised so that a stored context can be
/// shallow-merged with a newer one key by key (`jsonb || jsonb` in the
/// Postgres store) without erasing earlier values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Authenticated user, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Request identifier, usually from `x-request-id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Request URL or route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// HTTP method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Client user agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Client address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Route parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Request headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    /// Request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Query string parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    /// Session identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Correlation identifier spanning several requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Any other caller-supplied attributes.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn overwrite<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

impl ErrorContext {
    /// Shallow-merges `newer` into `self`. Every attribute set on `newer`
    /// replaces the corresponding attribute here; unset ones leave it alone.
    pub fn merge(&mut self, newer: ErrorContext) {
        overwrite(&mut self.user_id, newer.user_id);
        overwrite(&mut self.request_id, newer.request_id);
        overwrite(&mut self.url, newer.url);
        overwrite(&mut self.method, newer.method);
        overwrite(&mut self.user_agent, newer.user_agent);
        overwrite(&mut self.ip, newer.ip);
        overwrite(&mut self.params, newer.params);
        overwrite(&mut self.headers, newer.headers);
        overwrite(&mut self.body, newer.body);
        overwrite(&mut self.query, newer.query);
        overwrite(&mut self.session_id, newer.session_id);
        overwrite(&mut self.correlation_id, newer.correlation_id);
        self.extra.extend(newer.extra);
    }
}

/// A request-shaped description of the call that failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestInfo {
    /// Request URL.
    pub url: Option<String>,
    /// HTTP method.
    pub method: Option<String>,
    /// Request headers.
    pub headers: Option<BTreeMap<String, String>>,
    /// Request body.
    pub body: Option<Value>,
    /// Query string parameters.
    pub query: Option<Value>,
    /// Client address.
    pub ip: Option<String>,
    /// Authenticated user, when known.
    pub user_id: Option<String>,
}

impl RequestInfo {
    /// Looks up a header by name, ignoring ASCII case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.as_ref().and_then(|headers| {
            headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        })
    }
}
