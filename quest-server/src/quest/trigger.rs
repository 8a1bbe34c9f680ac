//! Quest Triggers
//!
//! Each quest is fed sample events by exactly one trigger source. The
//! config keys a trigger understands depend on its type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::json::{decode_embedded, is_truthy};
use crate::error::QuestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    BskyReply,
    FirehosePhrase,
    Poll,
    Webhook,
    Cron,
    DatabaseWatch,
}

impl TriggerType {
    pub fn from_str(s: &str) -> Result<Self, QuestError> {
        match s.trim() {
            "bsky_reply" => Ok(Self::BskyReply),
            "firehose_phrase" => Ok(Self::FirehosePhrase),
            "poll" => Ok(Self::Poll),
            "webhook" => Ok(Self::Webhook),
            "cron" => Ok(Self::Cron),
            "database_watch" => Ok(Self::DatabaseWatch),
            other => Err(QuestError::UnknownTrigger(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BskyReply => "bsky_reply",
            Self::FirehosePhrase => "firehose_phrase",
            Self::Poll => "poll",
            Self::Webhook => "webhook",
            Self::Cron => "cron",
            Self::DatabaseWatch => "database_watch",
        }
    }

    pub fn recognized_keys(&self) -> &'static [&'static str] {
        match self {
            Self::BskyReply => &["uri"],
            Self::FirehosePhrase => &["phrases", "case_sensitive"],
            Self::Poll => &["url", "interval"],
            Self::Webhook => &["path", "secret"],
            Self::Cron => &["schedule"],
            Self::DatabaseWatch => &["table", "column"],
        }
    }

    fn default_config(&self) -> Map<String, Value> {
        let value = match self {
            Self::FirehosePhrase => json!({"phrases": [], "case_sensitive": false}),
            _ => json!({}),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// Trigger type plus its config map
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trigger {
    #[serde(rename = "trigger_type")]
    pub trigger_type: TriggerType,
    #[serde(rename = "trigger_config")]
    pub config: Map<String, Value>,
}

impl Trigger {
    pub fn new(trigger_type: TriggerType) -> Self {
        Self {
            trigger_type,
            config: trigger_type.default_config(),
        }
    }

    pub fn with_config(trigger_type: TriggerType, config: Map<String, Value>) -> Self {
        let trigger = Self {
            trigger_type,
            config,
        };
        trigger.log_unrecognized_keys();
        trigger
    }

    /// Switch trigger source. The old config never carries over.
    pub fn change_type(&mut self, trigger_type: TriggerType) {
        if self.trigger_type != trigger_type {
            *self = Self::new(trigger_type);
        }
    }

    fn log_unrecognized_keys(&self) {
        let known = self.trigger_type.recognized_keys();
        for key in self.config.keys() {
            if !known.contains(&key.as_str()) {
                debug!(
                    "Trigger config key '{}' is not used by {}",
                    key,
                    self.trigger_type.as_str()
                );
            }
        }
    }

    /// Phrases for `firehose_phrase`; accepts an array or a comma-separated string.
    pub fn phrases(&self) -> Vec<String> {
        match self.config.get("phrases") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn case_sensitive(&self) -> bool {
        self.config.get("case_sensitive").map_or(false, is_truthy)
    }

    /// Poll interval in seconds. Invalid values are left for the scheduler to reject.
    pub fn poll_interval_secs(&self) -> Option<u64> {
        match self.config.get("interval")? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Read a stored `trigger_config`, native or JSON-encoded.
pub fn normalize_trigger_config(value: Option<&Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(s)) if s.trim().is_empty() => Map::new(),
        Some(Value::String(s)) => match decode_embedded("trigger_config", s) {
            Some(Value::Object(map)) => map,
            Some(_) => {
                warn!("Ignoring trigger_config that is not an object");
                Map::new()
            }
            None => Map::new(),
        },
        Some(Value::Null) | None => Map::new(),
        Some(_) => {
            warn!("Ignoring trigger_config that is not an object");
            Map::new()
        }
    }
}
