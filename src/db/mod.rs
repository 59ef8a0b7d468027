pub mod classifications;
pub mod intervals;
pub mod queries;
pub mod scores;
pub mod tasks;

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate, TimeZone};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttentionState {
    Green,
    Amber,
    Red,
}

impl AttentionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Amber => "amber",
            Self::Red => "red",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "green" => Some(Self::Green),
            "amber" => Some(Self::Amber),
            "red" => Some(Self::Red),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Deferred,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Deferred => "deferred",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "deferred" => Some(Self::Deferred),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GoalRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite DB: {}", path.display()))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;

        let database = Self { conn };
        database.init_schema()?;
        database.seed_default_classifications()?;

        Ok(database)
    }

    pub fn init_schema(&self) -> Result<()> {
        queries::schema_statements()
            .iter()
            .try_for_each(|statement| {
                self.conn
                    .execute(statement, [])
                    .context("Failed to initialize schema")
                    .map(|_| ())
            })
    }

    pub fn create_goal(
        &self,
        title: &str,
        description: Option<&str>,
        now: i64,
    ) -> Result<GoalRow> {
        self.conn
            .execute(
                "INSERT INTO goals (title, description, created_at) VALUES (?1, ?2, ?3)",
                params![title, description, now],
            )
            .context("Failed to insert goal")?;

        Ok(GoalRow {
            id: self.conn.last_insert_rowid(),
            title: title.to_string(),
            description: description.map(ToOwned::to_owned),
            created_at: now,
        })
    }

    pub fn list_goals(&self) -> Result<Vec<GoalRow>> {
        let mut statement = self
            .conn
            .prepare("SELECT id, title, description, created_at FROM goals ORDER BY created_at ASC")?;

        let rows = statement
            .query_map([], |row| {
                Ok(GoalRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query goals")?;

        Ok(rows)
    }

    pub fn delete_goal(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM goals WHERE id = ?1", params![id])
            .context("Failed to delete goal")?;

        Ok(deleted > 0)
    }

    pub fn create_category(&self, name: &str, now: i64) -> Result<CategoryRow> {
        self.conn
            .execute(
                "INSERT INTO categories (name, created_at) VALUES (?1, ?2)
                 ON CONFLICT(name) DO NOTHING",
                params![name, now],
            )
            .context("Failed to insert category")?;

        let row = self
            .conn
            .query_row(
                "SELECT id, name, created_at FROM categories WHERE name = ?1",
                params![name],
                |row| {
                    Ok(CategoryRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .context("Failed to read back category")?;

        Ok(row)
    }

    pub fn list_categories(&self) -> Result<Vec<CategoryRow>> {
        let mut statement = self
            .conn
            .prepare("SELECT id, name, created_at FROM categories ORDER BY name ASC")?;

        let rows = statement
            .query_map([], |row| {
                Ok(CategoryRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query categories")?;

        Ok(rows)
    }

    pub fn delete_category(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM categories WHERE id = ?1", params![id])
            .context("Failed to delete category")?;

        Ok(deleted > 0)
    }
}

pub fn day_bounds(date: NaiveDate) -> Result<(i64, i64)> {
    let from = date
        .and_hms_opt(0, 0, 0)
        .context("Failed to build day start")?;
    let to = (date + Duration::days(1))
        .and_hms_opt(0, 0, 0)
        .context("Failed to build day end")?;

    let from_ts = Local
        .from_local_datetime(&from)
        .single()
        .context("Failed to convert day start to local time")?
        .timestamp();
    let to_ts = Local
        .from_local_datetime(&to)
        .single()
        .context("Failed to convert day end to local time")?
        .timestamp()
        - 1;

    Ok((from_ts, to_ts))
}

#[cfg(test)]
pub(crate) fn open_test_db() -> (Database, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("temp dir");
    let database = Database::open(&dir.path().join("signaltrack.db")).expect("open db");
    (database, dir)
}

#[cfg(test)]
mod tests {
    use super::{AttentionState, TaskStatus, open_test_db};

    #[test]
    fn schema_init_is_idempotent() {
        let (database, _dir) = open_test_db();
        database.init_schema().expect("second init");
    }

    #[test]
    fn attention_state_round_trip() {
        for state in [
            AttentionState::Green,
            AttentionState::Amber,
            AttentionState::Red,
        ] {
            assert_eq!(AttentionState::parse(state.as_str()), Some(state));
        }
        assert_eq!(AttentionState::parse("unknown"), None);
    }

    #[test]
    fn category_create_is_upsert_by_name() {
        let (database, _dir) = open_test_db();
        let first = database.create_category("deep-work", 100).expect("create");
        let second = database.create_category("deep-work", 200).expect("create again");
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn deleting_goal_keeps_tasks() {
        let (database, _dir) = open_test_db();
        let goal = database.create_goal("ship v1", None, 10).expect("goal");

        let input = crate::db::tasks::TaskInput {
            title: "write docs".to_string(),
            goal_id: Some(goal.id),
            scheduled_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 2).expect("date"),
            ..Default::default()
        };
        let task = database.create_task(&input, 20).expect("task");

        assert!(database.delete_goal(goal.id).expect("delete"));
        let reloaded = database.task(task.id).expect("query").expect("present");
        assert_eq!(reloaded.goal_id, None);
        assert_eq!(reloaded.status, TaskStatus::Pending);
    }
}
