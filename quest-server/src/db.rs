use serde_json::Value;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::quest::{Quest, RawQuest};

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Self::migrate(&pool).await?;

        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        // conditions, commands and trigger_config hold JSON text
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quests (
                title TEXT PRIMARY KEY NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                enabled INTEGER NOT NULL DEFAULT 1,
                trigger_type TEXT NOT NULL DEFAULT 'bsky_reply',
                trigger_config TEXT DEFAULT '{}',
                conditions TEXT DEFAULT '[]',
                condition_operator TEXT DEFAULT 'AND',
                commands TEXT DEFAULT '[]',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        tracing::info!("Database migrations complete");
        Ok(())
    }

    /// Load every stored quest in its raw shape; normalization happens later.
    pub async fn load_quests(&self) -> Result<Vec<RawQuest>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT title, description, enabled, trigger_type, trigger_config, conditions, condition_operator, commands FROM quests ORDER BY title",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let text = |column: &str| -> Option<Value> {
                    r.get::<Option<String>, _>(column).map(Value::String)
                };
                RawQuest {
                    title: r.get("title"),
                    description: r.get("description"),
                    enabled: Some(Value::Bool(r.get::<i64, _>("enabled") != 0)),
                    trigger_type: r.get("trigger_type"),
                    trigger_config: text("trigger_config"),
                    conditions: text("conditions"),
                    condition_operator: text("condition_operator"),
                    commands: text("commands"),
                }
            })
            .collect())
    }

    /// Insert or replace a quest by title
    pub async fn save_quest(&self, quest: &Quest) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO quests
                (title, description, enabled, trigger_type, trigger_config, conditions, condition_operator, commands, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(title) DO UPDATE SET
                description = excluded.description,
                enabled = excluded.enabled,
                trigger_type = excluded.trigger_type,
                trigger_config = excluded.trigger_config,
                conditions = excluded.conditions,
                condition_operator = excluded.condition_operator,
                commands = excluded.commands,
                updated_at = excluded.updated_at"#,
        )
        .bind(&quest.title)
        .bind(&quest.description)
        .bind(quest.enabled as i64)
        .bind(quest.trigger_type().as_str())
        .bind(quest.trigger_config_json())
        .bind(quest.conditions_json())
        .bind(quest.condition_operator.as_str())
        .bind(quest.commands_json())
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn rename_quest(&self, old_title: &str, new_title: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE quests SET title = ?, updated_at = ? WHERE title = ?")
            .bind(new_title)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(old_title)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_quest(&self, title: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM quests WHERE title = ?")
            .bind(title)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[cfg(test)]
    pub async fn insert_raw(
        &self,
        title: &str,
        trigger_config: &str,
        conditions: &str,
        commands: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO quests (title, trigger_config, conditions, commands) VALUES (?, ?, ?, ?)")
            .bind(title)
            .bind(trigger_config)
            .bind(conditions)
            .bind(commands)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::quest::command::{Command, CommandType};
    use crate::quest::condition::ConditionType;
    use crate::quest::trigger::TriggerType;
    use tempfile::TempDir;

    pub async fn temp_database(dir: &TempDir) -> Database {
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("quests.db").display());
        Database::new(&url).await.unwrap()
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let db = temp_database(&dir).await;

        let mut quest = Quest::new("welcome");
        quest.description = "greet".into();
        quest.commands.push(Command::new(CommandType::GreetNewcomer, vec![]));
        db.save_quest(&quest).await.unwrap();

        quest.enabled = false;
        db.save_quest(&quest).await.unwrap();

        let raws = db.load_quests().await.unwrap();
        assert_eq!(raws.len(), 1);
        let loaded = Quest::from_raw(&raws[0]).unwrap();
        assert!(!loaded.enabled);
        assert_eq!(loaded.trigger_type(), TriggerType::BskyReply);
        assert_eq!(loaded.conditions[0].condition, ConditionType::AnyReply);
        assert_eq!(loaded.commands, quest.commands);
    }

    #[tokio::test]
    async fn test_malformed_columns_default() {
        let dir = TempDir::new().unwrap();
        let db = temp_database(&dir).await;
        db.insert_raw("legacy", "{broken", "reply_contains:hi", "[\"like_post\"")
            .await
            .unwrap();

        let raws = db.load_quests().await.unwrap();
        let quest = Quest::from_raw(&raws[0]).unwrap();
        assert!(quest.trigger.config.is_empty());
        assert_eq!(quest.conditions[0].args, vec!["hi".to_string()]);
        assert!(quest.commands.is_empty());
    }

    #[tokio::test]
    async fn test_rename_and_delete() {
        let dir = TempDir::new().unwrap();
        let db = temp_database(&dir).await;
        db.save_quest(&Quest::new("old")).await.unwrap();

        assert!(db.rename_quest("old", "new").await.unwrap());
        assert!(!db.rename_quest("missing", "other").await.unwrap());
        assert_eq!(db.load_quests().await.unwrap()[0].title, "new");

        assert!(db.delete_quest("new").await.unwrap());
        assert!(db.load_quests().await.unwrap().is_empty());
    }
}
