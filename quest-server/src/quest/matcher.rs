//! Condition Matcher
//!
//! Tests one normalized condition against a sample event. Text matching is
//! case-insensitive. Conditions that need canon, souvenir or biblio state
//! resolve through the caller's pre-resolved facts first, then any injected
//! services, and otherwise report that external data is required.

use super::condition::{Condition, ConditionType};
use super::events::SampleEvent;
use super::lookup::{BiblioService, CanonEntry, CanonStore, SampleFacts, Services, SouvenirRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub matched: bool,
    pub reason: String,
}

impl MatchOutcome {
    fn hit(reason: impl Into<String>) -> Self {
        Self {
            matched: true,
            reason: reason.into(),
        }
    }

    fn miss(reason: impl Into<String>) -> Self {
        Self {
            matched: false,
            reason: reason.into(),
        }
    }

    fn check(matched: bool, hit: impl Into<String>, miss: impl Into<String>) -> Self {
        if matched { Self::hit(hit) } else { Self::miss(miss) }
    }

    fn unresolved(condition: &ConditionType) -> Self {
        Self::miss(format!("Requires external data: {}", condition.as_str()))
    }

    fn missing_argument(what: &str) -> Self {
        Self::miss(format!("Missing argument: {}", what))
    }
}

pub fn match_condition(condition: &Condition, sample: &SampleEvent, services: &Services) -> MatchOutcome {
    let facts = SampleFacts::new(sample);

    if condition.condition.requires_external_data() {
        if let Some(verdict) = facts.verdict(condition.condition.as_str()) {
            return MatchOutcome::check(verdict, "Resolved by caller", "Resolved by caller as false");
        }
    }

    let resolver = Resolver {
        facts,
        services,
        handle: sample.handle(),
    };

    match &condition.condition {
        ConditionType::AnyReply | ConditionType::NewReply => MatchOutcome::check(
            !sample.text.is_empty(),
            "Reply has text",
            "Reply text is empty",
        ),
        ConditionType::DreamerReplies => match sample.handle() {
            None => MatchOutcome::miss("No handle on sample"),
            Some(handle) => MatchOutcome::check(
                sample.fact_truthy("registered"),
                format!("{} is a registered dreamer", handle),
                format!("{} is not registered", handle),
            ),
        },
        ConditionType::ContainsHashtags => match_needles(&condition.args, '#', &sample.text),
        ConditionType::ContainsMentions => match_needles(&condition.args, '@', &sample.text),
        ConditionType::ReplyContains => match condition.arg(0).filter(|a| !a.is_empty()) {
            None => MatchOutcome::missing_argument("phrase"),
            Some(phrase) => {
                let needle = phrase.to_lowercase();
                MatchOutcome::check(
                    sample.text.to_lowercase().contains(&needle),
                    format!("Text contains '{}'", phrase),
                    format!("Text does not contain '{}'", phrase),
                )
            }
        },
        ConditionType::HasCanon => match resolver.has_canon(condition.arg(0)) {
            Some(found) => MatchOutcome::check(found, "Canon found", "No matching canon"),
            None => MatchOutcome::unresolved(&condition.condition),
        },
        ConditionType::HasntCanon => {
            // Unknown canon counts as no canon.
            let found = resolver.has_canon(condition.arg(0)).unwrap_or(false);
            MatchOutcome::check(!found, "No matching canon", "Canon found")
        }
        ConditionType::CountCanon => match_count_canon(condition, &resolver),
        ConditionType::UserCanonEquals | ConditionType::UserCanonNotEquals => {
            let Some(key) = condition.arg(0) else {
                return MatchOutcome::missing_argument("canon key");
            };
            let Some(expected) = condition.arg(1) else {
                return MatchOutcome::missing_argument("canon value");
            };
            let Some(entries) = resolver.canon_entries() else {
                return MatchOutcome::unresolved(&condition.condition);
            };
            let equal = canon_values(&entries, key)
                .any(|value| value.trim().eq_ignore_ascii_case(expected.trim()));
            let want_equal = condition.condition == ConditionType::UserCanonEquals;
            MatchOutcome::check(
                equal == want_equal,
                format!("Canon '{}' check passed against '{}'", key, expected),
                format!("Canon '{}' check failed against '{}'", key, expected),
            )
        }
        ConditionType::UserInCanonList => {
            let Some(key) = condition.arg(0) else {
                return MatchOutcome::missing_argument("canon key");
            };
            let allowed: Vec<String> = split_list(&condition.args[1..])
                .map(|item| item.to_lowercase())
                .collect();
            if allowed.is_empty() {
                return MatchOutcome::missing_argument("canon list");
            }
            let Some(entries) = resolver.canon_entries() else {
                return MatchOutcome::unresolved(&condition.condition);
            };
            MatchOutcome::check(
                canon_values(&entries, key).any(|value| allowed.contains(&value.trim().to_lowercase())),
                format!("Canon '{}' is in the list", key),
                format!("Canon '{}' is not in the list", key),
            )
        }
        ConditionType::UserHasSouvenir | ConditionType::UserMissingSouvenir => {
            let Some(souvenir) = condition.arg(0) else {
                return MatchOutcome::missing_argument("souvenir");
            };
            let Some(held) = resolver.souvenirs() else {
                return MatchOutcome::unresolved(&condition.condition);
            };
            let has = held.iter().any(|s| s.eq_ignore_ascii_case(souvenir.trim()));
            let want = condition.condition == ConditionType::UserHasSouvenir;
            MatchOutcome::check(
                has == want,
                format!("Souvenir '{}' check passed", souvenir),
                format!("Souvenir '{}' check failed", souvenir),
            )
        }
        ConditionType::SouvenirExistsAnywhere => {
            let Some(souvenir) = condition.arg(0) else {
                return MatchOutcome::missing_argument("souvenir");
            };
            match resolver.souvenir_exists(souvenir) {
                Some(exists) => MatchOutcome::check(
                    exists,
                    format!("Souvenir '{}' has been awarded", souvenir),
                    format!("Souvenir '{}' has never been awarded", souvenir),
                ),
                None => MatchOutcome::unresolved(&condition.condition),
            }
        }
        ConditionType::HasRead => {
            let Some(work) = condition.arg(0) else {
                return MatchOutcome::missing_argument("work");
            };
            match resolver.has_read(work) {
                Some(read) => MatchOutcome::check(
                    read,
                    format!("Has read '{}'", work),
                    format!("Has not read '{}'", work),
                ),
                None => MatchOutcome::unresolved(&condition.condition),
            }
        }
        ConditionType::HasBiblioStamp => {
            let Some(stamp) = condition.arg(0) else {
                return MatchOutcome::missing_argument("stamp");
            };
            match resolver.has_stamp(stamp) {
                Some(stamped) => MatchOutcome::check(
                    stamped,
                    format!("Has stamp '{}'", stamp),
                    format!("Missing stamp '{}'", stamp),
                ),
                None => MatchOutcome::unresolved(&condition.condition),
            }
        }
        ConditionType::Unknown(_) => MatchOutcome::miss("Unknown condition type"),
    }
}

/// Comma-split every argument into trimmed, non-empty items
fn split_list(args: &[String]) -> impl Iterator<Item = &str> {
    args.iter()
        .flat_map(|arg| arg.split(','))
        .map(str::trim)
        .filter(|item| !item.is_empty())
}

/// Hashtag / mention matching: any needle, with its sigil stripped, found in the text
fn match_needles(args: &[String], sigil: char, text: &str) -> MatchOutcome {
    let needles: Vec<String> = split_list(args)
        .map(|item| item.trim_start_matches(sigil).to_lowercase())
        .filter(|item| !item.is_empty())
        .collect();

    if needles.is_empty() {
        return MatchOutcome::missing_argument(if sigil == '#' { "hashtags" } else { "mentions" });
    }

    let haystack = text.to_lowercase();
    match needles.iter().find(|needle| haystack.contains(needle.as_str())) {
        Some(found) => MatchOutcome::hit(format!("Found {}{}", sigil, found)),
        None => MatchOutcome::miss(format!(
            "None of {} found",
            needles
                .iter()
                .map(|n| format!("{}{}", sigil, n))
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }
}

fn match_count_canon(condition: &Condition, resolver: &Resolver<'_>) -> MatchOutcome {
    let key = condition.arg(0).map(str::trim).filter(|k| !k.is_empty() && *k != "*");
    let minimum = match condition.arg(1).map(str::trim) {
        None | Some("") => 1,
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) => n,
            Err(_) => return MatchOutcome::miss(format!("Invalid count '{}'", raw)),
        },
    };

    let Some(entries) = resolver.canon_entries() else {
        return MatchOutcome::unresolved(&condition.condition);
    };
    let count = entries
        .iter()
        .filter(|entry| key.map_or(true, |k| entry.key.eq_ignore_ascii_case(k)))
        .count();

    MatchOutcome::check(
        count >= minimum,
        format!("{} canon entries (need {})", count, minimum),
        format!("Only {} canon entries (need {})", count, minimum),
    )
}

fn canon_values<'e>(entries: &'e [CanonEntry], key: &'e str) -> impl Iterator<Item = &'e str> {
    entries
        .iter()
        .filter(move |entry| entry.key.eq_ignore_ascii_case(key.trim()))
        .filter_map(|entry| entry.value.as_deref())
}

/// Resolution order: sample facts, then injected services.
struct Resolver<'a> {
    facts: SampleFacts<'a>,
    services: &'a Services,
    handle: Option<&'a str>,
}

impl Resolver<'_> {
    fn canon_entries(&self) -> Option<Vec<CanonEntry>> {
        self.facts.canon_for("").or_else(|| {
            let handle = self.handle?;
            self.services.canon.as_ref()?.canon_for(handle)
        })
    }

    fn has_canon(&self, key: Option<&str>) -> Option<bool> {
        match key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => self
                .canon_entries()
                .map(|entries| entries.iter().any(|e| e.key.eq_ignore_ascii_case(key))),
            None => self.facts.has_any_canon("").or_else(|| {
                let handle = self.handle?;
                self.services.canon.as_ref()?.has_any_canon(handle)
            }),
        }
    }

    fn souvenirs(&self) -> Option<Vec<String>> {
        self.facts.souvenirs_for("").or_else(|| {
            let handle = self.handle?;
            self.services.souvenirs.as_ref()?.souvenirs_for(handle)
        })
    }

    fn souvenir_exists(&self, souvenir: &str) -> Option<bool> {
        self.facts
            .awarded_anywhere(souvenir)
            .or_else(|| self.services.souvenirs.as_ref()?.awarded_anywhere(souvenir))
    }

    fn has_read(&self, work: &str) -> Option<bool> {
        self.facts.has_read("", work).or_else(|| {
            let handle = self.handle?;
            self.services.biblio.as_ref()?.has_read(handle, work)
        })
    }

    fn has_stamp(&self, stamp: &str) -> Option<bool> {
        self.facts.has_stamp("", stamp).or_else(|| {
            let handle = self.handle?;
            self.services.biblio.as_ref()?.has_stamp(handle, stamp)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(condition: ConditionType, args: &[&str]) -> Condition {
        Condition::new(condition, args.iter().map(|a| a.to_string()).collect())
    }

    fn run(condition: &Condition, sample: &SampleEvent) -> MatchOutcome {
        match_condition(condition, sample, &Services::default())
    }

    #[test]
    fn test_any_reply_needs_text() {
        let c = cond(ConditionType::AnyReply, &[]);
        assert!(run(&c, &SampleEvent::new(None, "hello world")).matched);
        assert!(!run(&c, &SampleEvent::new(None, "")).matched);
        assert!(run(&cond(ConditionType::NewReply, &[]), &SampleEvent::new(None, "x")).matched);
    }

    #[test]
    fn test_dreamer_replies_needs_handle_and_registration() {
        let c = cond(ConditionType::DreamerReplies, &[]);
        let registered = SampleEvent::new(Some("a.bsky.social"), "hi").with_fact("registered", json!(true));
        assert!(run(&c, &registered).matched);

        let anonymous = SampleEvent::new(None, "hi").with_fact("registered", json!(true));
        assert!(!run(&c, &anonymous).matched);

        let unregistered = SampleEvent::new(Some("a.bsky.social"), "hi");
        assert!(!run(&c, &unregistered).matched);
    }

    #[test]
    fn test_hashtags_and_mentions() {
        let tags = cond(ConditionType::ContainsHashtags, &["#launch"]);
        assert!(run(&tags, &SampleEvent::new(None, "we go for #launch today")).matched);
        assert!(!run(&tags, &SampleEvent::new(None, "no tags here")).matched);

        let several = cond(ConditionType::ContainsHashtags, &["#dawn, Dusk"]);
        let outcome = run(&several, &SampleEvent::new(None, "at #DUSK we rest"));
        assert!(outcome.matched);
        assert_eq!(outcome.reason, "Found #dusk");

        let mentions = cond(ConditionType::ContainsMentions, &["@reverie.house"]);
        assert!(run(&mentions, &SampleEvent::new(None, "cc @Reverie.House")).matched);

        let empty = cond(ConditionType::ContainsHashtags, &[" , #"]);
        assert!(!run(&empty, &SampleEvent::new(None, "#anything")).matched);
    }

    #[test]
    fn test_reply_contains_is_case_insensitive() {
        let c = cond(ConditionType::ReplyContains, &["Urgent"]);
        assert!(run(&c, &SampleEvent::new(None, "this is URGENT")).matched);
        assert!(!run(&c, &SampleEvent::new(None, "please respond")).matched);

        let missing = run(&cond(ConditionType::ReplyContains, &[]), &SampleEvent::new(None, "x"));
        assert!(!missing.matched);
        assert!(missing.reason.starts_with("Missing argument"));
    }

    #[test]
    fn test_hasnt_canon_checks_top_level_and_extra() {
        let c = cond(ConditionType::HasntCanon, &[]);
        assert!(run(&c, &SampleEvent::new(None, "x")).matched);
        assert!(!run(&c, &SampleEvent::new(None, "x").with_fact("has_canon", json!(true))).matched);
        assert!(
            !run(
                &c,
                &SampleEvent::new(None, "x").with_fact("extra", json!({"has_canon": true}))
            )
            .matched
        );
    }

    #[test]
    fn test_hasnt_canon_top_level_false_does_not_hide_extra() {
        let c = cond(ConditionType::HasntCanon, &[]);
        let sample = SampleEvent::new(None, "x")
            .with_fact("has_canon", json!(false))
            .with_fact("extra", json!({"has_canon": true}));
        let outcome = run(&c, &sample);
        assert!(!outcome.matched);
        assert_eq!(outcome.reason, "Canon found");

        let both_false = SampleEvent::new(None, "x")
            .with_fact("has_canon", json!(false))
            .with_fact("extra", json!({"has_canon": false}));
        assert!(run(&c, &both_false).matched);
    }

    #[test]
    fn test_external_conditions_do_not_guess() {
        let sample = SampleEvent::new(Some("a.bsky.social"), "x");
        for c in [
            cond(ConditionType::HasCanon, &[]),
            cond(ConditionType::UserHasSouvenir, &["bell"]),
            cond(ConditionType::UserMissingSouvenir, &["bell"]),
            cond(ConditionType::SouvenirExistsAnywhere, &["bell"]),
            cond(ConditionType::HasRead, &["book"]),
            cond(ConditionType::HasBiblioStamp, &["spring"]),
            cond(ConditionType::CountCanon, &["arrival", "2"]),
        ] {
            let outcome = run(&c, &sample);
            assert!(!outcome.matched, "{:?} should not match", c.condition);
            assert!(outcome.reason.starts_with("Requires external data"));
        }
    }

    #[test]
    fn test_caller_verdict_wins() {
        let sample = SampleEvent::new(None, "x").with_fact("extra", json!({"user_has_souvenir": true}));
        let outcome = run(&cond(ConditionType::UserHasSouvenir, &["bell"]), &sample);
        assert!(outcome.matched);
        assert_eq!(outcome.reason, "Resolved by caller");
    }

    #[test]
    fn test_canon_conditions_from_facts() {
        let sample = SampleEvent::new(None, "x").with_fact(
            "canon",
            json!([
                {"key": "origin", "value": "North"},
                {"key": "arrival"},
                {"key": "arrival"}
            ]),
        );

        assert!(run(&cond(ConditionType::HasCanon, &["origin"]), &sample).matched);
        assert!(!run(&cond(ConditionType::HasntCanon, &["origin"]), &sample).matched);
        assert!(run(&cond(ConditionType::HasntCanon, &["spectrum"]), &sample).matched);
        assert!(run(&cond(ConditionType::CountCanon, &["arrival", "2"]), &sample).matched);
        assert!(!run(&cond(ConditionType::CountCanon, &["arrival", "3"]), &sample).matched);
        assert!(run(&cond(ConditionType::CountCanon, &["*", "3"]), &sample).matched);
        assert!(!run(&cond(ConditionType::CountCanon, &["arrival", "many"]), &sample).matched);
        assert!(run(&cond(ConditionType::UserCanonEquals, &["origin", "north"]), &sample).matched);
        assert!(!run(&cond(ConditionType::UserCanonNotEquals, &["origin", "north"]), &sample).matched);
        assert!(run(&cond(ConditionType::UserCanonNotEquals, &["origin", "south"]), &sample).matched);
        assert!(run(&cond(ConditionType::UserInCanonList, &["origin", "south, north"]), &sample).matched);
        assert!(!run(&cond(ConditionType::UserInCanonList, &["origin", "east", "west"]), &sample).matched);
    }

    #[test]
    fn test_unknown_condition_type() {
        let outcome = run(
            &cond(ConditionType::Unknown("moon_phase".into()), &[]),
            &SampleEvent::new(None, "x"),
        );
        assert!(!outcome.matched);
        assert_eq!(outcome.reason, "Unknown condition type");
    }
}
