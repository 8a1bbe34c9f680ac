//! Quest Registry
//!
//! Caches quest definitions, applies granular edits, and writes them
//! through to the database. Seed quests can also be loaded from TOML/JSON
//! files and hot-reloaded during development.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::command::Command;
use super::condition::{Condition, ConditionOperator};
use super::definition::{Quest, RawQuest, RawQuestFile};
use super::evaluator::{EvaluationResult, QuestRuleEvaluator};
use super::events::SampleEvent;
use super::trigger::{Trigger, TriggerType};
use crate::db::Database;
use crate::error::{QuestError, QuestResult};

pub struct QuestRegistry {
    /// Loaded quests keyed by title
    quests: RwLock<HashMap<String, Arc<Quest>>>,
    /// Directory holding seed quest files
    seed_dir: PathBuf,
    db: Option<Arc<Database>>,
    evaluator: QuestRuleEvaluator,
}

impl QuestRegistry {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            quests: RwLock::new(HashMap::new()),
            seed_dir: data_dir.join("quests"),
            db: None,
            evaluator: QuestRuleEvaluator::new(),
        }
    }

    pub fn with_database(mut self, db: Arc<Database>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_evaluator(mut self, evaluator: QuestRuleEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Load stored quests, then any seed quests not already stored
    pub async fn load_all(&self) -> QuestResult<usize> {
        if let Some(db) = &self.db {
            let raws = db.load_quests().await?;
            let mut quests = self.quests.write().await;
            for raw in raws {
                match Quest::from_raw(&raw) {
                    Ok(quest) => {
                        quests.insert(quest.title.clone(), Arc::new(quest));
                    }
                    Err(e) => warn!("Skipping stored quest '{}': {}", raw.title, e),
                }
            }
            info!("Loaded {} stored quests", quests.len());
        }

        self.load_seed_files(false).await?;
        Ok(self.count().await)
    }

    /// Import seed files. With `overwrite`, files replace existing quests.
    pub async fn load_seed_files(&self, overwrite: bool) -> QuestResult<usize> {
        if !self.seed_dir.exists() {
            warn!("Quest seed directory does not exist: {:?}", self.seed_dir);
            return Ok(0);
        }

        let mut paths = Vec::new();
        collect_seed_paths(&self.seed_dir, &mut paths)?;
        paths.sort();

        let mut count = 0;
        for path in paths {
            match self.load_seed_file(&path, overwrite).await {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to load quest {:?}: {}", path, e),
            }
        }
        info!("Imported {} seed quests from {:?}", count, self.seed_dir);
        Ok(count)
    }

    async fn load_seed_file(&self, path: &Path, overwrite: bool) -> QuestResult<bool> {
        let content = std::fs::read_to_string(path).map_err(|source| QuestError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let parse_error = |message: String| QuestError::Parse {
            path: path.display().to_string(),
            message,
        };
        let raw: RawQuest = if path.extension().map_or(false, |ext| ext == "json") {
            // JSON seeds may be wrapped in `{"quest": ...}` or bare
            let mut value: Value =
                serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))?;
            let inner = value.get_mut("quest").map(Value::take);
            serde_json::from_value(inner.unwrap_or(value)).map_err(|e| parse_error(e.to_string()))?
        } else {
            let file: RawQuestFile =
                toml::from_str(&content).map_err(|e| parse_error(e.to_string()))?;
            file.quest
        };

        let quest = Quest::from_raw(&raw)?;
        if !overwrite && self.get(&quest.title).await.is_some() {
            return Ok(false);
        }

        info!("Loaded seed quest: {}", quest.title);
        self.upsert(quest).await?;
        Ok(true)
    }

    pub async fn get(&self, title: &str) -> Option<Arc<Quest>> {
        self.quests.read().await.get(title).cloned()
    }

    /// All quests, sorted by title
    pub async fn list(&self) -> Vec<Arc<Quest>> {
        let quests = self.quests.read().await;
        let mut all: Vec<Arc<Quest>> = quests.values().cloned().collect();
        all.sort_by(|a, b| a.title.cmp(&b.title));
        all
    }

    pub async fn count(&self) -> usize {
        self.quests.read().await.len()
    }

    async fn persist(&self, quest: &Quest) -> QuestResult<()> {
        if let Some(db) = &self.db {
            db.save_quest(quest).await?;
        }
        Ok(())
    }

    /// Create a quest with the default single `any_reply` condition
    pub async fn create(&self, title: &str, description: &str) -> QuestResult<Arc<Quest>> {
        let mut quest = Quest::new(title);
        if quest.title.is_empty() {
            return Err(QuestError::EmptyTitle);
        }
        quest.description = description.to_string();

        let mut quests = self.quests.write().await;
        if quests.contains_key(&quest.title) {
            return Err(QuestError::AlreadyExists(quest.title));
        }
        self.persist(&quest).await?;

        info!("Created quest '{}'", quest.title);
        let quest = Arc::new(quest);
        quests.insert(quest.title.clone(), quest.clone());
        Ok(quest)
    }

    /// Insert or replace a whole quest
    pub async fn upsert(&self, quest: Quest) -> QuestResult<Arc<Quest>> {
        let mut quests = self.quests.write().await;
        self.persist(&quest).await?;
        let quest = Arc::new(quest);
        quests.insert(quest.title.clone(), quest.clone());
        Ok(quest)
    }

    /// Apply an edit to a copy of the quest, persist it, then publish it
    async fn modify<F>(&self, title: &str, edit: F) -> QuestResult<Arc<Quest>>
    where
        F: FnOnce(&mut Quest) -> QuestResult<()>,
    {
        let mut quests = self.quests.write().await;
        let current = quests
            .get(title)
            .ok_or_else(|| QuestError::NotFound(title.to_string()))?;

        let mut updated = Quest::clone(current);
        edit(&mut updated)?;
        self.persist(&updated).await?;

        let updated = Arc::new(updated);
        quests.insert(title.to_string(), updated.clone());
        Ok(updated)
    }

    pub async fn rename(&self, title: &str, new_title: &str) -> QuestResult<Arc<Quest>> {
        let new_title = new_title.trim();
        if new_title.is_empty() {
            return Err(QuestError::EmptyTitle);
        }

        let mut quests = self.quests.write().await;
        let current = quests
            .get(title)
            .cloned()
            .ok_or_else(|| QuestError::NotFound(title.to_string()))?;
        if new_title == title {
            return Ok(current);
        }
        if quests.contains_key(new_title) {
            return Err(QuestError::AlreadyExists(new_title.to_string()));
        }

        if let Some(db) = &self.db {
            db.rename_quest(title, new_title).await?;
        }

        let mut renamed = Quest::clone(&current);
        renamed.title = new_title.to_string();
        let renamed = Arc::new(renamed);
        quests.remove(title);
        quests.insert(renamed.title.clone(), renamed.clone());

        info!("Renamed quest '{}' to '{}'", title, new_title);
        Ok(renamed)
    }

    pub async fn update_details(
        &self,
        title: &str,
        description: Option<String>,
        enabled: Option<bool>,
    ) -> QuestResult<Arc<Quest>> {
        self.modify(title, |quest| {
            if let Some(description) = description {
                quest.description = description;
            }
            if let Some(enabled) = enabled {
                quest.enabled = enabled;
            }
            Ok(())
        })
        .await
    }

    /// Change the trigger. A new type starts from that type's default
    /// config; a supplied config replaces the current one outright.
    pub async fn set_trigger(
        &self,
        title: &str,
        trigger_type: TriggerType,
        config: Option<Map<String, Value>>,
    ) -> QuestResult<Arc<Quest>> {
        self.modify(title, |quest| {
            quest.trigger.change_type(trigger_type);
            if let Some(config) = config {
                quest.trigger = Trigger::with_config(trigger_type, config);
            }
            Ok(())
        })
        .await
    }

    pub async fn set_condition_operator(
        &self,
        title: &str,
        operator: ConditionOperator,
    ) -> QuestResult<Arc<Quest>> {
        self.modify(title, |quest| {
            quest.condition_operator = operator;
            Ok(())
        })
        .await
    }

    pub async fn add_condition(&self, title: &str, condition: Condition) -> QuestResult<Arc<Quest>> {
        self.modify(title, |quest| {
            quest.conditions.push(condition);
            Ok(())
        })
        .await
    }

    pub async fn update_condition(
        &self,
        title: &str,
        index: usize,
        condition: Condition,
    ) -> QuestResult<Arc<Quest>> {
        self.modify(title, |quest| {
            let len = quest.conditions.len();
            let slot = quest
                .conditions
                .get_mut(index)
                .ok_or(QuestError::IndexOutOfRange { kind: "condition", index, len })?;
            *slot = condition;
            Ok(())
        })
        .await
    }

    pub async fn remove_condition(&self, title: &str, index: usize) -> QuestResult<Arc<Quest>> {
        self.modify(title, |quest| {
            let len = quest.conditions.len();
            if index >= len {
                return Err(QuestError::IndexOutOfRange { kind: "condition", index, len });
            }
            quest.conditions.remove(index);
            Ok(())
        })
        .await
    }

    pub async fn add_command(&self, title: &str, command: Command) -> QuestResult<Arc<Quest>> {
        self.modify(title, |quest| {
            quest.commands.push(command);
            Ok(())
        })
        .await
    }

    pub async fn update_command(
        &self,
        title: &str,
        index: usize,
        command: Command,
    ) -> QuestResult<Arc<Quest>> {
        self.modify(title, |quest| {
            let len = quest.commands.len();
            let slot = quest
                .commands
                .get_mut(index)
                .ok_or(QuestError::IndexOutOfRange { kind: "command", index, len })?;
            *slot = command;
            Ok(())
        })
        .await
    }

    pub async fn remove_command(&self, title: &str, index: usize) -> QuestResult<Arc<Quest>> {
        self.modify(title, |quest| {
            let len = quest.commands.len();
            if index >= len {
                return Err(QuestError::IndexOutOfRange { kind: "command", index, len });
            }
            quest.commands.remove(index);
            Ok(())
        })
        .await
    }

    pub async fn delete(&self, title: &str) -> QuestResult<()> {
        let mut quests = self.quests.write().await;
        if !quests.contains_key(title) {
            return Err(QuestError::NotFound(title.to_string()));
        }
        if let Some(db) = &self.db {
            db.delete_quest(title).await?;
        }
        quests.remove(title);
        info!("Deleted quest '{}'", title);
        Ok(())
    }

    /// Evaluate one stored quest without running anything
    pub async fn dry_run(&self, title: &str, sample: &SampleEvent) -> QuestResult<EvaluationResult> {
        let quest = self
            .get(title)
            .await
            .ok_or_else(|| QuestError::NotFound(title.to_string()))?;
        if !quest.enabled {
            return Err(QuestError::Disabled(quest.title.clone()));
        }
        Ok(self.evaluator.evaluate(&quest, sample))
    }

    /// Evaluate a quest that has not been stored
    pub fn evaluate_draft(&self, quest: &Quest, sample: &SampleEvent) -> QuestResult<EvaluationResult> {
        if !quest.enabled {
            return Err(QuestError::Disabled(quest.title.clone()));
        }
        Ok(self.evaluator.evaluate(quest, sample))
    }

    /// Evaluate every enabled quest fed by `trigger_type`, sorted by title
    pub async fn evaluate_trigger(
        &self,
        trigger_type: TriggerType,
        sample: &SampleEvent,
    ) -> Vec<(String, EvaluationResult)> {
        self.list()
            .await
            .into_iter()
            .filter(|quest| quest.enabled && quest.trigger_type() == trigger_type)
            .map(|quest| (quest.title.clone(), self.evaluator.evaluate(&quest, sample)))
            .collect()
    }

    /// Start file watcher for hot-reload of seed quests
    /// Returns a channel receiver that signals when reloads occur
    pub fn start_file_watcher(
        self: &Arc<Self>,
    ) -> Result<tokio::sync::mpsc::Receiver<HotReloadEvent>, String> {
        use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
        use std::time::Duration;

        if !self.seed_dir.exists() {
            return Err(format!("Seed directory {:?} does not exist", self.seed_dir));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(32);
        let registry = Arc::clone(self);
        let seed_dir = self.seed_dir.clone();
        let rt = tokio::runtime::Handle::current();

        std::thread::spawn(move || {
            let (notify_tx, notify_rx) = std::sync::mpsc::channel();

            let mut watcher = match RecommendedWatcher::new(
                move |res: Result<notify::Event, notify::Error>| {
                    if let Ok(event) = res {
                        let _ = notify_tx.send(event);
                    }
                },
                Config::default().with_poll_interval(Duration::from_secs(1)),
            ) {
                Ok(w) => w,
                Err(e) => {
                    error!("Failed to create file watcher: {}", e);
                    return;
                }
            };

            if let Err(e) = watcher.watch(&seed_dir, RecursiveMode::Recursive) {
                error!("Failed to watch quest directory: {}", e);
                return;
            }

            info!("Quest hot-reload watcher started for {:?}", seed_dir);

            while let Ok(event) = notify_rx.recv() {
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    continue;
                }
                for path in event.paths.into_iter().filter(|p| is_seed_file(p)) {
                    info!("Detected change in {:?}, triggering reload", path);

                    let reg = Arc::clone(&registry);
                    let tx = tx.clone();
                    rt.spawn(async move {
                        let event = match reg.load_seed_file(&path, true).await {
                            Ok(_) => HotReloadEvent::Reloaded(path.to_string_lossy().to_string()),
                            Err(e) => {
                                error!("Hot-reload failed: {}", e);
                                HotReloadEvent::Error(e.to_string())
                            }
                        };
                        let _ = tx.send(event).await;
                    });
                }
            }
        });

        Ok(rx)
    }
}

fn is_seed_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("toml") | Some("json")
    )
}

fn collect_seed_paths(dir: &Path, paths: &mut Vec<PathBuf>) -> QuestResult<()> {
    let io_error = |source| QuestError::Io {
        path: dir.display().to_string(),
        source,
    };

    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.is_dir() {
            collect_seed_paths(&path, paths)?;
        } else if is_seed_file(&path) {
            paths.push(path);
        }
    }
    Ok(())
}

/// Events from the hot-reload watcher
#[derive(Debug, Clone)]
pub enum HotReloadEvent {
    /// A file was reloaded successfully
    Reloaded(String),
    /// An error occurred during reload
    Error(String),
}
