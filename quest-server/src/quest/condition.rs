//! Quest Conditions
//!
//! Conditions arrive in several historical shapes: a bare tag string, a
//! `"tag:value"` string, or an object carrying `args` or a legacy `value`.
//! Everything is normalized into [`Condition`] here, before any matching runs.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::json::{decode_embedded, is_truthy, looks_like_json, read_args};

/// Condition tags understood by the matcher
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionType {
    AnyReply,
    NewReply,
    DreamerReplies,
    ContainsHashtags,
    ContainsMentions,
    ReplyContains,
    HasCanon,
    HasntCanon,
    CountCanon,
    UserCanonEquals,
    UserCanonNotEquals,
    UserInCanonList,
    UserHasSouvenir,
    UserMissingSouvenir,
    SouvenirExistsAnywhere,
    HasRead,
    HasBiblioStamp,
    /// Tag outside the vocabulary, kept verbatim for diagnostics
    Unknown(String),
}

impl ConditionType {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "any_reply" => Self::AnyReply,
            "new_reply" => Self::NewReply,
            "dreamer_replies" => Self::DreamerReplies,
            "contains_hashtags" => Self::ContainsHashtags,
            "contains_mentions" => Self::ContainsMentions,
            "reply_contains" => Self::ReplyContains,
            "has_canon" => Self::HasCanon,
            "hasnt_canon" => Self::HasntCanon,
            "count_canon" => Self::CountCanon,
            "user_canon_equals" => Self::UserCanonEquals,
            "user_canon_not_equals" => Self::UserCanonNotEquals,
            "user_in_canon_list" => Self::UserInCanonList,
            "user_has_souvenir" => Self::UserHasSouvenir,
            "user_missing_souvenir" => Self::UserMissingSouvenir,
            "souvenir_exists_anywhere" => Self::SouvenirExistsAnywhere,
            "has_read" => Self::HasRead,
            "has_biblio_stamp" => Self::HasBiblioStamp,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::AnyReply => "any_reply",
            Self::NewReply => "new_reply",
            Self::DreamerReplies => "dreamer_replies",
            Self::ContainsHashtags => "contains_hashtags",
            Self::ContainsMentions => "contains_mentions",
            Self::ReplyContains => "reply_contains",
            Self::HasCanon => "has_canon",
            Self::HasntCanon => "hasnt_canon",
            Self::CountCanon => "count_canon",
            Self::UserCanonEquals => "user_canon_equals",
            Self::UserCanonNotEquals => "user_canon_not_equals",
            Self::UserInCanonList => "user_in_canon_list",
            Self::UserHasSouvenir => "user_has_souvenir",
            Self::UserMissingSouvenir => "user_missing_souvenir",
            Self::SouvenirExistsAnywhere => "souvenir_exists_anywhere",
            Self::HasRead => "has_read",
            Self::HasBiblioStamp => "has_biblio_stamp",
            Self::Unknown(tag) => tag,
        }
    }

    /// Whether matching needs canon, souvenir or biblio lookups
    pub fn requires_external_data(&self) -> bool {
        matches!(
            self,
            Self::HasCanon
                | Self::CountCanon
                | Self::UserCanonEquals
                | Self::UserCanonNotEquals
                | Self::UserInCanonList
                | Self::UserHasSouvenir
                | Self::UserMissingSouvenir
                | Self::SouvenirExistsAnywhere
                | Self::HasRead
                | Self::HasBiblioStamp
        )
    }
}

impl From<String> for ConditionType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<ConditionType> for String {
    fn from(t: ConditionType) -> Self {
        t.as_str().to_string()
    }
}

/// Logic tag used both quest-wide (`condition_operator`) and per condition
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionOperator {
    #[default]
    And,
    Or,
    Not,
    Unrecognized(String),
}

impl ConditionOperator {
    /// Absent or blank values mean AND; anything else unknown is preserved.
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "" | "AND" => Self::And,
            "OR" => Self::Or,
            "NOT" => Self::Not,
            _ => Self::Unrecognized(trimmed.to_string()),
        }
    }

    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) => Self::parse(s),
            Some(Value::Null) | None => Self::And,
            Some(other) => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
            Self::Unrecognized(raw) => raw,
        }
    }
}

impl From<String> for ConditionOperator {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<ConditionOperator> for String {
    fn from(op: ConditionOperator) -> Self {
        op.as_str().to_string()
    }
}

/// A normalized condition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub condition: ConditionType,
    pub args: Vec<String>,
    /// Stored with the condition but not applied when combining results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<ConditionOperator>,
    pub once_only: bool,
    pub disabled: bool,
    /// The shape this condition was read from, echoed in dry-run output
    #[serde(skip)]
    pub source: Value,
}

impl Condition {
    pub fn new(condition: ConditionType, args: Vec<String>) -> Self {
        Self {
            condition,
            args,
            operator: None,
            once_only: false,
            disabled: false,
            source: Value::Null,
        }
    }

    /// The original representation, or the canonical one when built in code
    pub fn raw(&self) -> Value {
        if self.source.is_null() {
            serde_json::to_value(self).unwrap_or(Value::Null)
        } else {
            self.source.clone()
        }
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

/// Split `"tag:value"` into its tag and inline argument.
fn split_inline(tag: &str) -> (ConditionType, Option<String>) {
    match tag.split_once(':') {
        Some((head, rest)) => (ConditionType::parse(head), Some(rest.to_string())),
        None => (ConditionType::parse(tag), None),
    }
}

/// Normalize one condition entry. Returns `None` for null or empty entries.
pub fn normalize_condition(value: &Value) -> Option<Condition> {
    match value {
        Value::String(s) => {
            if s.trim().is_empty() {
                return None;
            }
            let (condition, inline) = split_inline(s.trim());
            let mut normalized = Condition::new(condition, inline.into_iter().collect());
            normalized.source = value.clone();
            Some(normalized)
        }
        Value::Object(obj) => {
            let tag = obj
                .get("condition")
                .or_else(|| obj.get("type"))
                .and_then(Value::as_str)
                .unwrap_or("");
            let (condition, inline) = split_inline(tag.trim());
            // An empty `args` list does not override an inline `tag:value`
            let args = read_args(obj)
                .filter(|args| !args.is_empty())
                .unwrap_or_else(|| inline.into_iter().collect());

            Some(Condition {
                condition,
                args,
                operator: obj
                    .get("operator")
                    .filter(|op| !op.is_null())
                    .map(|op| ConditionOperator::from_value(Some(op))),
                once_only: obj.get("once_only").map_or(false, is_truthy),
                disabled: obj.get("disabled").map_or(false, is_truthy),
                source: value.clone(),
            })
        }
        _ => None,
    }
}

/// Normalize a stored `conditions` field into an ordered list.
pub fn normalize_conditions(value: Option<&Value>) -> Vec<Condition> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter_map(normalize_condition).collect(),
        Some(Value::String(s)) if looks_like_json(s) => match decode_embedded("conditions", s) {
            Some(decoded) if !decoded.is_string() => normalize_conditions(Some(&decoded)),
            _ => Vec::new(),
        },
        Some(single) => normalize_condition(single).into_iter().collect(),
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        normalize_condition(&value)
            .ok_or_else(|| serde::de::Error::custom("expected a condition string or object"))
    }
}
