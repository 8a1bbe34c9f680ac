//! Lookups for conditions that depend on state outside the sample event.
//!
//! Every lookup answers `None` when it cannot tell, so the matcher can fall
//! through to the next source instead of guessing.

use std::sync::Arc;

use serde_json::Value;

use super::events::SampleEvent;
use super::json::scalar_to_string;

/// One lore entry recorded for a dreamer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonEntry {
    pub key: String,
    pub value: Option<String>,
}

impl CanonEntry {
    pub fn new(key: &str, value: Option<&str>) -> Self {
        Self {
            key: key.to_string(),
            value: value.map(str::to_string),
        }
    }
}

pub trait CanonStore: Send + Sync {
    fn canon_for(&self, handle: &str) -> Option<Vec<CanonEntry>>;

    fn has_any_canon(&self, handle: &str) -> Option<bool> {
        self.canon_for(handle).map(|entries| !entries.is_empty())
    }
}

pub trait SouvenirRegistry: Send + Sync {
    fn souvenirs_for(&self, handle: &str) -> Option<Vec<String>>;

    /// Whether anyone at all holds this souvenir
    fn awarded_anywhere(&self, souvenir: &str) -> Option<bool>;
}

pub trait BiblioService: Send + Sync {
    fn has_read(&self, handle: &str, work: &str) -> Option<bool>;

    fn has_stamp(&self, handle: &str, stamp: &str) -> Option<bool>;
}

/// Injected services; any of them may be missing
#[derive(Clone, Default)]
pub struct Services {
    pub canon: Option<Arc<dyn CanonStore>>,
    pub souvenirs: Option<Arc<dyn SouvenirRegistry>>,
    pub biblio: Option<Arc<dyn BiblioService>>,
}

/// Facts the caller resolved ahead of time and put on the sample
pub struct SampleFacts<'a> {
    sample: &'a SampleEvent,
}

impl<'a> SampleFacts<'a> {
    pub fn new(sample: &'a SampleEvent) -> Self {
        Self { sample }
    }

    /// A verdict keyed by the condition tag itself, e.g. `"has_read": true`
    pub fn verdict(&self, condition_tag: &str) -> Option<bool> {
        self.sample.flag(condition_tag)
    }

    fn string_list(&self, key: &str) -> Option<Vec<String>> {
        match self.sample.fact(key)? {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Object(obj) => obj
                            .get("key")
                            .or_else(|| obj.get("name"))
                            .and_then(scalar_to_string),
                        other => scalar_to_string(other),
                    })
                    .collect(),
            ),
            Value::String(s) => Some(
                s.split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect(),
            ),
            _ => None,
        }
    }

    fn list_contains(&self, key: &str, needle: &str) -> Option<bool> {
        self.string_list(key)
            .map(|items| items.iter().any(|item| item.eq_ignore_ascii_case(needle.trim())))
    }
}

impl CanonStore for SampleFacts<'_> {
    fn canon_for(&self, _handle: &str) -> Option<Vec<CanonEntry>> {
        match self.sample.fact("canon")? {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Object(obj) => {
                            let key = obj.get("key").and_then(scalar_to_string)?;
                            let value = obj.get("value").and_then(scalar_to_string);
                            Some(CanonEntry { key, value })
                        }
                        other => scalar_to_string(other).map(|key| CanonEntry { key, value: None }),
                    })
                    .collect(),
            ),
            Value::Object(map) => Some(
                map.iter()
                    .map(|(key, value)| CanonEntry {
                        key: key.clone(),
                        value: scalar_to_string(value),
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    fn has_any_canon(&self, handle: &str) -> Option<bool> {
        if let Some(flag) = self.sample.flag("has_canon") {
            return Some(flag);
        }
        self.canon_for(handle).map(|entries| !entries.is_empty())
    }
}

impl SouvenirRegistry for SampleFacts<'_> {
    fn souvenirs_for(&self, _handle: &str) -> Option<Vec<String>> {
        self.string_list("souvenirs")
    }

    fn awarded_anywhere(&self, souvenir: &str) -> Option<bool> {
        self.list_contains("souvenir_exists", souvenir)
    }
}

impl BiblioService for SampleFacts<'_> {
    fn has_read(&self, _handle: &str, work: &str) -> Option<bool> {
        self.list_contains("read", work)
    }

    fn has_stamp(&self, _handle: &str, stamp: &str) -> Option<bool> {
        self.list_contains("biblio_stamps", stamp)
    }
}
