//! Sample Events
//!
//! The input a quest is evaluated against: a handle, reply text and any
//! ad hoc facts the caller wants to supply (`registered`, `has_canon`, ...).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::json::is_truthy;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default)]
    pub text: String,
    /// Every other field, including an optional nested `extra` object
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl SampleEvent {
    pub fn new(handle: Option<&str>, text: &str) -> Self {
        Self {
            handle: handle.map(str::to_string),
            text: text.to_string(),
            fields: Map::new(),
        }
    }

    pub fn with_fact(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    /// Non-empty handle, if any
    pub fn handle(&self) -> Option<&str> {
        self.handle.as_deref().map(str::trim).filter(|h| !h.is_empty())
    }

    /// Look a fact up at the top level first, then under `extra`.
    pub fn fact(&self, key: &str) -> Option<&Value> {
        self.fields
            .get(key)
            .filter(|v| !v.is_null())
            .or_else(|| {
                self.fields
                    .get("extra")
                    .and_then(Value::as_object)
                    .and_then(|extra| extra.get(key))
                    .filter(|v| !v.is_null())
            })
    }

    pub fn fact_truthy(&self, key: &str) -> bool {
        self.fact(key).map_or(false, is_truthy)
    }

    /// A boolean flag that may be set at the top level, under `extra`, or
    /// both. True if either is truthy; `None` if neither is present.
    pub fn flag(&self, key: &str) -> Option<bool> {
        let top = self.fields.get(key).filter(|v| !v.is_null());
        let nested = self
            .fields
            .get("extra")
            .and_then(Value::as_object)
            .and_then(|extra| extra.get(key))
            .filter(|v| !v.is_null());

        if top.is_none() && nested.is_none() {
            return None;
        }
        Some(top.map_or(false, is_truthy) || nested.map_or(false, is_truthy))
    }
}
