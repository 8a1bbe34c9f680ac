//! Quest System Module
//!
//! Quest definitions with tolerant normalization of stored shapes, a pure
//! rule evaluator for dry runs and live triggers, and a registry that
//! caches quests, applies edits and persists them.

pub mod command;
pub mod condition;
pub mod definition;
pub mod evaluator;
pub mod events;
pub mod json;
pub mod lookup;
pub mod matcher;
pub mod registry;
pub mod trigger;

pub use condition::ConditionOperator;
pub use definition::{Quest, RawQuest};
pub use evaluator::EvaluationResult;
pub use events::SampleEvent;
pub use registry::{HotReloadEvent, QuestRegistry};
pub use trigger::TriggerType;
