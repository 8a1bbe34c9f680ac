//! Error types shared by the registry, storage and HTTP layers.
//!
//! The rule evaluator never returns these; every per-condition failure
//! degrades to a non-match with a reason instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuestError {
    #[error("quest '{0}' not found")]
    NotFound(String),

    #[error("quest '{0}' already exists")]
    AlreadyExists(String),

    #[error("quest '{0}' is disabled")]
    Disabled(String),

    #[error("quest title must not be empty")]
    EmptyTitle,

    #[error("unknown trigger type '{0}'")]
    UnknownTrigger(String),

    #[error("{kind} index {index} out of range (quest has {len})")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        len: usize,
    },

    #[error("invalid {0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
}

pub type QuestResult<T> = Result<T, QuestError>;
