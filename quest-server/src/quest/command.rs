//! Quest Commands
//!
//! Action templates queued when a quest's conditions match. Like conditions,
//! commands may be stored canonically (`{cmd, args}`) or as a legacy
//! `"type:param"` string.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::json::{decode_embedded, looks_like_json, read_args};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CommandType {
    NameDreamer,
    RegistrationCheck,
    RegisterIfNeeded,
    AddKindred,
    LikePost,
    /// args: `[key, eventDescription, canonType, rowstyle?]`
    AddCanon,
    AddName,
    DisableQuest,
    ModSpectrum,
    AwardSouvenir,
    ReplyOriginSpectrum,
    ReplyPost,
    Paired,
    CheckCollaborationPartners,
    CalculateOrigin,
    GreetNewcomer,
    DeclareOrigin,
    Unknown(String),
}

impl CommandType {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "name_dreamer" => Self::NameDreamer,
            "registration_check" => Self::RegistrationCheck,
            "register_if_needed" => Self::RegisterIfNeeded,
            "add_kindred" => Self::AddKindred,
            "like_post" => Self::LikePost,
            "add_canon" => Self::AddCanon,
            "add_name" => Self::AddName,
            "disable_quest" => Self::DisableQuest,
            "mod_spectrum" => Self::ModSpectrum,
            "award_souvenir" => Self::AwardSouvenir,
            "reply_origin_spectrum" => Self::ReplyOriginSpectrum,
            "reply_post" => Self::ReplyPost,
            "paired" => Self::Paired,
            "check_collaboration_partners" => Self::CheckCollaborationPartners,
            "calculate_origin" => Self::CalculateOrigin,
            "greet_newcomer" => Self::GreetNewcomer,
            "declare_origin" => Self::DeclareOrigin,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::NameDreamer => "name_dreamer",
            Self::RegistrationCheck => "registration_check",
            Self::RegisterIfNeeded => "register_if_needed",
            Self::AddKindred => "add_kindred",
            Self::LikePost => "like_post",
            Self::AddCanon => "add_canon",
            Self::AddName => "add_name",
            Self::DisableQuest => "disable_quest",
            Self::ModSpectrum => "mod_spectrum",
            Self::AwardSouvenir => "award_souvenir",
            Self::ReplyOriginSpectrum => "reply_origin_spectrum",
            Self::ReplyPost => "reply_post",
            Self::Paired => "paired",
            Self::CheckCollaborationPartners => "check_collaboration_partners",
            Self::CalculateOrigin => "calculate_origin",
            Self::GreetNewcomer => "greet_newcomer",
            Self::DeclareOrigin => "declare_origin",
            Self::Unknown(tag) => tag,
        }
    }
}

impl From<String> for CommandType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<CommandType> for String {
    fn from(t: CommandType) -> Self {
        t.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    pub cmd: CommandType,
    pub args: Vec<String>,
}

impl Command {
    pub fn new(cmd: CommandType, args: Vec<String>) -> Self {
        Self { cmd, args }
    }

    /// Flat descriptor used for display and dispatch: `cmd` or `cmd:arg1:arg2`
    pub fn descriptor(&self) -> String {
        if self.args.is_empty() {
            self.cmd.as_str().to_string()
        } else {
            format!("{}:{}", self.cmd.as_str(), self.args.join(":"))
        }
    }
}

pub fn normalize_command(value: &Value) -> Option<Command> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            // Only the first colon separates the tag; the rest is one parameter.
            Some(match s.split_once(':') {
                Some((cmd, param)) => Command::new(CommandType::parse(cmd), vec![param.to_string()]),
                None => Command::new(CommandType::parse(s), Vec::new()),
            })
        }
        Value::Object(obj) => {
            let tag = obj
                .get("cmd")
                .or_else(|| obj.get("command"))
                .or_else(|| obj.get("type"))
                .and_then(Value::as_str)?
                .trim();
            if tag.is_empty() {
                return None;
            }
            Some(Command::new(CommandType::parse(tag), read_args(obj).unwrap_or_default()))
        }
        _ => None,
    }
}

pub fn normalize_commands(value: Option<&Value>) -> Vec<Command> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter_map(normalize_command).collect(),
        Some(Value::String(s)) if looks_like_json(s) => match decode_embedded("commands", s) {
            Some(decoded) if !decoded.is_string() => normalize_commands(Some(&decoded)),
            _ => Vec::new(),
        },
        Some(single) => normalize_command(single).into_iter().collect(),
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        normalize_command(&value)
            .ok_or_else(|| serde::de::Error::custom("expected a command string or object"))
    }
}
