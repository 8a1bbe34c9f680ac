//! Quest Rule Evaluator
//!
//! Pure and synchronous: given a quest and a sample event, report which
//! conditions matched, whether the quest as a whole matched, and which
//! commands would run. Dry runs in the admin API and the live trigger
//! pipeline both go through here so their answers agree.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::condition::ConditionOperator;
use super::definition::Quest;
use super::events::SampleEvent;
use super::lookup::{BiblioService, CanonStore, Services, SouvenirRegistry};
use super::matcher::match_condition;

/// Diagnostic for one evaluated condition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionResult {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub matched: bool,
    pub reason: String,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub matched: bool,
    pub operator: String,
    pub conditions_evaluated: Vec<ConditionResult>,
    /// Command descriptors in declared order; empty unless matched
    pub commands: Vec<String>,
}

/// Combine condition results. An empty list never matches, and only AND
/// and OR are understood; anything else fails closed.
pub fn combine(operator: &ConditionOperator, results: &[bool]) -> bool {
    if results.is_empty() {
        return false;
    }
    match operator {
        ConditionOperator::And => results.iter().all(|matched| *matched),
        ConditionOperator::Or => results.iter().any(|matched| *matched),
        ConditionOperator::Not | ConditionOperator::Unrecognized(_) => false,
    }
}

#[derive(Clone, Default)]
pub struct QuestRuleEvaluator {
    services: Services,
}

impl QuestRuleEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_canon_store(mut self, store: Arc<dyn CanonStore>) -> Self {
        self.services.canon = Some(store);
        self
    }

    pub fn with_souvenir_registry(mut self, registry: Arc<dyn SouvenirRegistry>) -> Self {
        self.services.souvenirs = Some(registry);
        self
    }

    pub fn with_biblio_service(mut self, service: Arc<dyn BiblioService>) -> Self {
        self.services.biblio = Some(service);
        self
    }

    pub fn evaluate(&self, quest: &Quest, sample: &SampleEvent) -> EvaluationResult {
        // Every active condition is evaluated, even once the outcome is
        // decided, so dry runs show the full picture.
        let conditions_evaluated: Vec<ConditionResult> = quest
            .active_conditions()
            .map(|condition| {
                let outcome = match_condition(condition, sample, &self.services);
                debug!(
                    "Quest '{}' condition {} -> {} ({})",
                    quest.title,
                    condition.condition.as_str(),
                    outcome.matched,
                    outcome.reason
                );
                ConditionResult {
                    condition_type: condition.condition.as_str().to_string(),
                    matched: outcome.matched,
                    reason: outcome.reason,
                    raw: condition.raw(),
                }
            })
            .collect();

        let flags: Vec<bool> = conditions_evaluated.iter().map(|r| r.matched).collect();
        let matched = combine(&quest.condition_operator, &flags);

        let commands = if matched {
            quest.commands.iter().map(|c| c.descriptor()).collect()
        } else {
            Vec::new()
        };

        debug!(
            "Quest '{}' evaluated: matched={} ({} conditions, {} commands)",
            quest.title,
            matched,
            conditions_evaluated.len(),
            commands.len()
        );

        EvaluationResult {
            matched,
            operator: quest.condition_operator.as_str().to_string(),
            conditions_evaluated,
            commands,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::command::{Command, CommandType};
    use crate::quest::condition::{Condition, ConditionType};
    use crate::quest::definition::RawQuest;
    use crate::quest::lookup::CanonEntry;
    use serde_json::json;

    fn quest_with(conditions: Value, operator: &str) -> Quest {
        Quest::from_raw(&RawQuest {
            title: "test quest".into(),
            conditions: Some(conditions),
            condition_operator: Some(json!(operator)),
            commands: Some(json!(["like_post", {"cmd": "add_canon", "args": ["k", "replied", "event"]}])),
            ..Default::default()
        })
        .unwrap()
    }

    fn evaluate(quest: &Quest, sample: &SampleEvent) -> EvaluationResult {
        QuestRuleEvaluator::new().evaluate(quest, sample)
    }

    #[test]
    fn test_empty_conditions_never_match() {
        for op in ["AND", "OR", "NOT", "XOR", ""] {
            let quest = quest_with(json!([]), op);
            let result = evaluate(&quest, &SampleEvent::new(None, "anything"));
            assert!(!result.matched, "operator {:?}", op);
            assert!(result.commands.is_empty());
        }
    }

    #[test]
    fn test_and_semantics() {
        let sample = SampleEvent::new(None, "hello world");
        let all_true = quest_with(json!(["any_reply", "reply_contains:hello"]), "AND");
        assert!(evaluate(&all_true, &sample).matched);

        let one_false = quest_with(json!(["any_reply", "reply_contains:bye", "new_reply"]), "AND");
        assert!(!evaluate(&one_false, &sample).matched);
    }

    #[test]
    fn test_or_semantics() {
        let sample = SampleEvent::new(None, "hello world");
        let one_true = quest_with(json!(["reply_contains:bye", "reply_contains:world"]), "OR");
        assert!(evaluate(&one_true, &sample).matched);

        let none_true = quest_with(json!(["reply_contains:bye", "reply_contains:later"]), "OR");
        assert!(!evaluate(&none_true, &sample).matched);
    }

    #[test]
    fn test_disabled_conditions_are_absent() {
        let sample = SampleEvent::new(None, "hello");
        let quest = quest_with(
            json!([
                {"condition": "reply_contains", "args": ["bye"]},
                {"condition": "any_reply", "disabled": true}
            ]),
            "OR",
        );
        let result = evaluate(&quest, &sample);
        assert!(!result.matched);
        assert_eq!(result.conditions_evaluated.len(), 1);

        let only_disabled = quest_with(json!([{"condition": "any_reply", "disabled": true}]), "AND");
        assert!(!evaluate(&only_disabled, &sample).matched);
    }

    #[test]
    fn test_commands_gated_on_match() {
        let quest = quest_with(json!(["reply_contains:urgent"]), "AND");

        let hit = evaluate(&quest, &SampleEvent::new(None, "URGENT: help"));
        assert!(hit.matched);
        assert_eq!(hit.commands, vec!["like_post".to_string(), "add_canon:k:replied:event".to_string()]);

        let miss = evaluate(&quest, &SampleEvent::new(None, "please respond"));
        assert!(!miss.matched);
        assert!(miss.commands.is_empty());
    }

    #[test]
    fn test_legacy_and_canonical_equivalence() {
        let sample = SampleEvent::new(None, "well hello there");
        let legacy = quest_with(json!(["reply_contains:hello"]), "AND");
        let canonical = quest_with(json!([{"condition": "reply_contains", "args": ["hello"]}]), "AND");

        let a = evaluate(&legacy, &sample);
        let b = evaluate(&canonical, &sample);
        assert_eq!(a.matched, b.matched);
        assert_eq!(a.commands, b.commands);
        assert_eq!(a.conditions_evaluated[0].reason, b.conditions_evaluated[0].reason);
        assert_eq!(a.conditions_evaluated[0].raw, json!("reply_contains:hello"));
    }

    #[test]
    fn test_idempotent() {
        let quest = quest_with(json!(["any_reply", "contains_hashtags:#launch", "has_canon"]), "OR");
        let sample = SampleEvent::new(Some("a.bsky.social"), "#launch").with_fact("extra", json!({"x": 1}));
        let first = serde_json::to_string(&evaluate(&quest, &sample)).unwrap();
        let second = serde_json::to_string(&evaluate(&quest, &sample)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_concrete_scenarios() {
        let a = quest_with(json!([{"condition": "any_reply"}]), "AND");
        assert!(evaluate(&a, &SampleEvent::new(None, "hello world")).matched);

        let b = quest_with(json!([{"condition": "reply_contains", "args": ["urgent"]}]), "AND");
        assert!(!evaluate(&b, &SampleEvent::new(None, "please respond")).matched);

        let c = quest_with(json!([{"condition": "contains_hashtags", "args": ["#launch"]}]), "AND");
        assert!(evaluate(&c, &SampleEvent::new(None, "we go for #launch today")).matched);
        assert!(!evaluate(&c, &SampleEvent::new(None, "no tags here")).matched);

        let d = quest_with(json!([]), "OR");
        assert!(!evaluate(&d, &SampleEvent::new(Some("h"), "any text")).matched);
    }

    #[test]
    fn test_unknown_condition_does_not_abort_siblings() {
        let quest = quest_with(json!(["moon_phase", "any_reply"]), "OR");
        let result = evaluate(&quest, &SampleEvent::new(None, "hi"));
        assert!(result.matched);
        assert_eq!(result.conditions_evaluated[0].reason, "Unknown condition type");
        assert!(result.conditions_evaluated[1].matched);
    }

    #[test]
    fn test_not_operator_fails_closed() {
        let quest = quest_with(json!(["reply_contains:never"]), "NOT");
        let result = evaluate(&quest, &SampleEvent::new(None, "hi"));
        assert!(!result.matched);
        assert_eq!(result.operator, "NOT");
    }

    #[test]
    fn test_combine_directly() {
        assert!(combine(&ConditionOperator::And, &[true, true]));
        assert!(!combine(&ConditionOperator::And, &[true, false]));
        assert!(combine(&ConditionOperator::Or, &[false, true]));
        assert!(!combine(&ConditionOperator::Or, &[]));
        assert!(!combine(&ConditionOperator::Unrecognized("XOR".into()), &[true]));
    }

    struct FixedCanon;

    impl CanonStore for FixedCanon {
        fn canon_for(&self, handle: &str) -> Option<Vec<CanonEntry>> {
            (handle == "known.bsky.social").then(|| vec![CanonEntry::new("origin", Some("north"))])
        }
    }

    #[test]
    fn test_injected_canon_store() {
        let evaluator = QuestRuleEvaluator::new().with_canon_store(Arc::new(FixedCanon));
        let mut quest = Quest::new("origin check");
        quest.conditions = vec![Condition::new(
            ConditionType::UserCanonEquals,
            vec!["origin".into(), "North".into()],
        )];
        quest.commands = vec![Command::new(CommandType::DeclareOrigin, vec![])];

        let known = evaluator.evaluate(&quest, &SampleEvent::new(Some("known.bsky.social"), "hi"));
        assert!(known.matched);
        assert_eq!(known.commands, vec!["declare_origin".to_string()]);

        let stranger = evaluator.evaluate(&quest, &SampleEvent::new(Some("other.bsky.social"), "hi"));
        assert!(!stranger.matched);
        assert!(stranger.conditions_evaluated[0].reason.starts_with("Requires external data"));
    }
}
