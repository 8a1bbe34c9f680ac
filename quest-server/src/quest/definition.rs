//! Quest Definition Structures
//!
//! `RawQuest` mirrors what quest storage and seed files hold, duck-typed
//! fields included. `Quest` is the resolved form everything else works on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::command::{Command, normalize_commands};
use super::condition::{Condition, ConditionOperator, ConditionType, normalize_conditions};
use super::json::is_truthy;
use super::trigger::{Trigger, TriggerType, normalize_trigger_config};
use crate::error::QuestError;

/// A quest file (TOML or JSON) wrapping one quest
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuestFile {
    pub quest: RawQuest,
}

/// Quest data as stored externally
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawQuest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Missing means enabled
    #[serde(default)]
    pub enabled: Option<Value>,
    #[serde(default)]
    pub trigger_type: Option<String>,
    /// Object or JSON-encoded string
    #[serde(default)]
    pub trigger_config: Option<Value>,
    /// Array, single entry, or JSON-encoded string
    #[serde(default)]
    pub conditions: Option<Value>,
    #[serde(default)]
    pub condition_operator: Option<Value>,
    #[serde(default)]
    pub commands: Option<Value>,
}

/// A fully resolved quest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawQuest")]
pub struct Quest {
    pub title: String,
    pub description: String,
    pub enabled: bool,
    #[serde(flatten)]
    pub trigger: Trigger,
    pub conditions: Vec<Condition>,
    pub condition_operator: ConditionOperator,
    pub commands: Vec<Command>,
}

impl Quest {
    /// A freshly created quest: one `any_reply` condition, no commands.
    pub fn new(title: &str) -> Self {
        Self {
            title: title.trim().to_string(),
            description: String::new(),
            enabled: true,
            trigger: Trigger::new(TriggerType::BskyReply),
            conditions: vec![Condition::new(ConditionType::AnyReply, Vec::new())],
            condition_operator: ConditionOperator::And,
            commands: Vec::new(),
        }
    }

    /// Create a Quest from stored data
    pub fn from_raw(raw: &RawQuest) -> Result<Self, QuestError> {
        let title = raw.title.trim();
        if title.is_empty() {
            return Err(QuestError::EmptyTitle);
        }

        let trigger_type = match raw.trigger_type.as_deref() {
            Some(t) if !t.trim().is_empty() => TriggerType::from_str(t)?,
            _ => TriggerType::BskyReply,
        };
        let trigger = match &raw.trigger_config {
            None | Some(Value::Null) => Trigger::new(trigger_type),
            Some(config) => Trigger::with_config(trigger_type, normalize_trigger_config(Some(config))),
        };

        Ok(Self {
            title: title.to_string(),
            description: raw.description.clone(),
            enabled: raw.enabled.as_ref().map_or(true, is_truthy),
            trigger,
            conditions: normalize_conditions(raw.conditions.as_ref()),
            condition_operator: ConditionOperator::from_value(raw.condition_operator.as_ref()),
            commands: normalize_commands(raw.commands.as_ref()),
        })
    }

    pub fn trigger_type(&self) -> TriggerType {
        self.trigger.trigger_type
    }

    /// Conditions that take part in evaluation
    pub fn active_conditions(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter().filter(|c| !c.disabled)
    }

    /// Canonical JSON for the storage columns that may hold encoded JSON
    pub fn conditions_json(&self) -> String {
        serde_json::to_string(&self.conditions).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn commands_json(&self) -> String {
        serde_json::to_string(&self.commands).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn trigger_config_json(&self) -> String {
        serde_json::to_string(&self.trigger.config).unwrap_or_else(|_| "{}".to_string())
    }
}

impl TryFrom<RawQuest> for Quest {
    type Error = QuestError;

    fn try_from(raw: RawQuest) -> Result<Self, Self::Error> {
        Quest::from_raw(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::command::CommandType;
    use serde_json::json;

    #[test]
    fn test_new_quest_defaults() {
        let quest = Quest::new("  First Light ");
        assert_eq!(quest.title, "First Light");
        assert!(quest.enabled);
        assert_eq!(quest.conditions.len(), 1);
        assert_eq!(quest.conditions[0].condition, ConditionType::AnyReply);
        assert!(quest.commands.is_empty());
        assert_eq!(quest.condition_operator, ConditionOperator::And);
    }

    #[test]
    fn test_from_raw_with_encoded_fields() {
        let raw: RawQuest = serde_json::from_value(json!({
            "title": "welcome",
            "description": "greet new dreamers",
            "enabled": 1,
            "trigger_type": "firehose_phrase",
            "trigger_config": "{\"phrases\": [\"hello reverie\"], \"case_sensitive\": false}",
            "conditions": "[\"any_reply\", \"reply_contains:hello\"]",
            "condition_operator": "OR",
            "commands": ["like_post", {"cmd": "greet_newcomer", "args": []}]
        }))
        .unwrap();

        let quest = Quest::from_raw(&raw).unwrap();
        assert!(quest.enabled);
        assert_eq!(quest.trigger_type(), TriggerType::FirehosePhrase);
        assert_eq!(quest.trigger.phrases(), vec!["hello reverie".to_string()]);
        assert_eq!(quest.conditions.len(), 2);
        assert_eq!(quest.condition_operator, ConditionOperator::Or);
        assert_eq!(quest.commands[1].cmd, CommandType::GreetNewcomer);
    }

    #[test]
    fn test_from_raw_tolerates_malformed_json() {
        let raw = RawQuest {
            title: "broken".into(),
            trigger_config: Some(json!("{not json")),
            conditions: Some(json!("[{\"condition\"")),
            ..Default::default()
        };
        let quest = Quest::from_raw(&raw).unwrap();
        assert!(quest.conditions.is_empty());
        assert!(quest.trigger.config.is_empty());
        assert!(quest.enabled);
    }

    #[test]
    fn test_absent_trigger_config_uses_type_default() {
        let raw = RawQuest {
            title: "phrase watch".into(),
            trigger_type: Some("firehose_phrase".into()),
            ..Default::default()
        };
        let quest = Quest::from_raw(&raw).unwrap();
        assert_eq!(quest.trigger, Trigger::new(TriggerType::FirehosePhrase));
        assert_eq!(quest.trigger.config["phrases"], json!([]));
        assert_eq!(quest.trigger.config["case_sensitive"], json!(false));

        let null_config = RawQuest {
            trigger_config: Some(Value::Null),
            ..raw
        };
        assert_eq!(Quest::from_raw(&null_config).unwrap().trigger, quest.trigger);
    }

    #[test]
    fn test_from_raw_rejects_bad_title_and_trigger() {
        let blank = RawQuest {
            title: "   ".into(),
            ..Default::default()
        };
        assert!(matches!(Quest::from_raw(&blank), Err(QuestError::EmptyTitle)));

        let bad_trigger = RawQuest {
            title: "t".into(),
            trigger_type: Some("smoke_signal".into()),
            ..Default::default()
        };
        assert!(matches!(
            Quest::from_raw(&bad_trigger),
            Err(QuestError::UnknownTrigger(_))
        ));
    }

    #[test]
    fn test_canonical_serialization_round_trips() {
        let mut quest = Quest::new("roundtrip");
        quest.commands.push(Command::new(CommandType::LikePost, vec![]));
        let value = serde_json::to_value(&quest).unwrap();
        assert_eq!(value["trigger_type"], json!("bsky_reply"));
        assert_eq!(value["conditions"][0]["condition"], json!("any_reply"));
        assert_eq!(value["condition_operator"], json!("AND"));

        let back: Quest = serde_json::from_value(value).unwrap();
        assert_eq!(back.title, quest.title);
        assert_eq!(back.commands, quest.commands);
    }

    #[test]
    fn test_toml_quest_file() {
        let content = r##"
[quest]
title = "bell ringer"
trigger_type = "bsky_reply"
conditions = ["dreamer_replies", { condition = "contains_hashtags", args = ["#bell"] }]
commands = ["award_souvenir:bell"]
"##;
        let file: RawQuestFile = toml::from_str(content).unwrap();
        let quest = Quest::from_raw(&file.quest).unwrap();
        assert_eq!(quest.conditions.len(), 2);
        assert_eq!(quest.conditions[1].args, vec!["#bell".to_string()]);
        assert_eq!(quest.commands[0].descriptor(), "award_souvenir:bell");
    }
}
