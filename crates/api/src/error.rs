//! Normalization of the error bodies the backend can return.
//!
//! Three shapes reach the client:
//!
//! - the API envelope `{ success, statusCode, message, errors, data }`
//! - ASP.NET problem details `{ title, detail, errors }`
//! - no body at all, when the request never got a response

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An error response reduced to what callers display or branch on.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct NormalizedError {
    /// HTTP status, `None` for network failures.
    pub status: Option<u16>,
    pub message: String,
    /// Per-field validation messages.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_errors: BTreeMap<String, Vec<String>>,
    /// Messages not tied to a field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts", ts(type = "unknown"))]
    pub data: Option<Value>,
}

impl NormalizedError {
    /// Normalize an error response body.
    pub fn from_body(status: u16, body: &[u8]) -> Self {
        let parsed: Option<Value> = serde_json::from_slice(body).ok();
        match parsed {
            Some(Value::Object(obj)) => Self::from_object(status, &obj),
            Some(Value::String(message)) if !message.trim().is_empty() => Self {
                status: Some(status),
                message,
                ..Self::default()
            },
            _ => {
                let text = String::from_utf8_lossy(body).trim().to_string();
                Self {
                    status: Some(status),
                    message: if text.is_empty() || text.len() > 512 {
                        default_message(status).to_string()
                    } else {
                        text
                    },
                    ..Self::default()
                }
            }
        }
    }

    /// A request that never received a response.
    pub fn network(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: None,
            message: if message.is_empty() {
                "network error".to_string()
            } else {
                message
            },
            ..Self::default()
        }
    }

    pub fn is_network(&self) -> bool {
        self.status.is_none()
    }

    fn from_object(status: u16, obj: &serde_json::Map<String, Value>) -> Self {
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let status = obj
            .get("statusCode")
            .or_else(|| obj.get("status"))
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or(status);

        let mut field_errors = BTreeMap::new();
        let mut errors = Vec::new();
        match obj.get("errors") {
            Some(Value::Object(map)) => {
                for (field, messages) in map {
                    let messages = messages_of(messages);
                    if !messages.is_empty() {
                        field_errors.insert(field.clone(), messages);
                    }
                }
            }
            Some(other) => errors = messages_of(other),
            None => {}
        }

        let message = text("message")
            .or_else(|| text("detail"))
            .or_else(|| text("title"))
            .or_else(|| text("error"))
            .or_else(|| errors.first().cloned())
            .unwrap_or_else(|| default_message(status).to_string());

        Self {
            status: Some(status),
            message,
            field_errors,
            errors,
            data: obj.get("data").filter(|v| !v.is_null()).cloned(),
        }
    }
}

impl std::fmt::Display for NormalizedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{status}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for NormalizedError {}

fn messages_of(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o
                    .get("message")
                    .or_else(|| o.get("errorMessage"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn default_message(status: u16) -> &'static str {
    match status {
        400 => "bad request",
        401 => "unauthorized",
        403 => "forbidden",
        404 => "not found",
        409 => "conflict",
        422 => "validation failed",
        500..=599 => "server error",
        _ => "request failed",
    }
}
