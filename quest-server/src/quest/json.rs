//! Helpers for the loosely-typed JSON that quest storage hands us.
//!
//! Stored quests may hold `conditions`, `commands` and `trigger_config`
//! either as native JSON or as JSON-encoded strings, and flags may be any
//! truthy value.

use serde_json::Value;
use tracing::warn;

/// Returns true if a string looks like encoded JSON rather than a bare tag.
pub fn looks_like_json(s: &str) -> bool {
    let trimmed = s.trim_start();
    trimmed.starts_with('[') || trimmed.starts_with('{')
}

/// Decode a JSON-encoded field. Malformed input is logged and treated as absent.
pub fn decode_embedded(field: &str, s: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(s) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring malformed {} JSON: {}", field, e);
            None
        }
    }
}

/// JavaScript-style truthiness.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Render a scalar as a string argument. Nested structures are rejected.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read an `args` field (array of scalars or a single string) with a legacy
/// `value` fallback.
pub fn read_args(obj: &serde_json::Map<String, Value>) -> Option<Vec<String>> {
    match obj.get("args") {
        Some(Value::Array(items)) => {
            return Some(items.iter().filter_map(scalar_to_string).collect());
        }
        Some(Value::Null) | None => {}
        Some(other) => {
            if let Some(single) = scalar_to_string(other) {
                return Some(vec![single]);
            }
        }
    }

    obj.get("value")
        .and_then(scalar_to_string)
        .map(|value| vec![value])
}
