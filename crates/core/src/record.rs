//! Loosely-shaped entity records as they travel between the list endpoints
//! and the list view.

use serde_json::{Map, Value};

/// A single entity record: the JSON object returned by a list endpoint.
pub type Record = Map<String, Value>;

/// Identity of a record under some id field.
///
/// Backed by the canonical JSON text of the id value, so the number `1` and
/// the string `"1"` are different identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordId(String);

impl RecordId {
    /// Read the identity of `record` under `id_key`.
    ///
    /// Returns `None` when the field is missing or `null`.
    pub fn of(record: &Record, id_key: &str) -> Option<Self> {
        match record.get(id_key) {
            None | Some(Value::Null) => None,
            Some(value) => Some(Self(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// JSON truthiness: `null`, `false`, `0`, and `""` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn id_distinguishes_numbers_from_strings() {
        let a = RecordId::of(&record(json!({"idProperty": 1})), "idProperty");
        let b = RecordId::of(&record(json!({"idProperty": "1"})), "idProperty");
        assert!(a.is_some());
        assert_ne!(a, b);
    }

    #[test]
    fn missing_or_null_id_has_no_identity() {
        assert!(RecordId::of(&record(json!({"name": "A"})), "idProperty").is_none());
        assert!(RecordId::of(&record(json!({"idProperty": null})), "idProperty").is_none());
    }

    #[test]
    fn truthiness_matches_json_conventions() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(false)));
        assert!(is_truthy(&json!("cover.jpg")));
        assert!(is_truthy(&json!({"url": "x"})));
        assert!(is_truthy(&json!([])));
    }
}
