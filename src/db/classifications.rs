use crate::db::{AttentionState, Database};
use anyhow::{Context, Result};
use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};

const SEED_CLASSIFICATIONS: &str = include_str!("../../assets/classifications.json");

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationRow {
    pub id: i64,
    pub app_name: String,
    pub bundle_id: Option<String>,
    pub default_state: AttentionState,
    pub keyword_rules: Vec<String>,
    pub is_custom: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationInput {
    pub app_name: String,
    #[serde(default)]
    pub bundle_id: Option<String>,
    pub default_state: AttentionState,
    #[serde(default)]
    pub keyword_rules: Vec<String>,
}

fn classification_from_row(row: &Row<'_>) -> rusqlite::Result<ClassificationRow> {
    let bundle_id: String = row.get(2)?;
    let default_state: String = row.get(3)?;
    let keyword_rules: String = row.get(4)?;

    Ok(ClassificationRow {
        id: row.get(0)?,
        app_name: row.get(1)?,
        bundle_id: (!bundle_id.is_empty()).then_some(bundle_id),
        default_state: AttentionState::parse(&default_state).unwrap_or(AttentionState::Amber),
        keyword_rules: serde_json::from_str(&keyword_rules).unwrap_or_default(),
        is_custom: row.get::<_, i64>(5)? != 0,
    })
}

impl Database {
    pub fn list_classifications(&self) -> Result<Vec<ClassificationRow>> {
        let mut statement = self.conn.prepare(
            "SELECT id, app_name, bundle_id, default_state, keyword_rules, is_custom \
             FROM app_classifications ORDER BY app_name ASC",
        )?;

        let rows = statement
            .query_map([], classification_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query app classifications")?;

        Ok(rows)
    }

    pub fn upsert_classification(
        &self,
        input: &ClassificationInput,
        is_custom: bool,
    ) -> Result<ClassificationRow> {
        let bundle_id = input.bundle_id.clone().unwrap_or_default();
        let keyword_rules = serde_json::to_string(&input.keyword_rules)
            .context("Failed to serialize keyword rules")?;

        self.conn
            .execute(
                "INSERT INTO app_classifications \
                 (app_name, bundle_id, default_state, keyword_rules, is_custom) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(app_name, bundle_id) \
                 DO UPDATE SET default_state = excluded.default_state, \
                               keyword_rules = excluded.keyword_rules, \
                               is_custom = excluded.is_custom",
                params![
                    input.app_name,
                    bundle_id,
                    input.default_state.as_str(),
                    keyword_rules,
                    is_custom as i64,
                ],
            )
            .context("Failed to upsert app classification")?;

        let row = self
            .conn
            .query_row(
                "SELECT id, app_name, bundle_id, default_state, keyword_rules, is_custom \
                 FROM app_classifications WHERE app_name = ?1 AND bundle_id = ?2",
                params![input.app_name, bundle_id],
                classification_from_row,
            )
            .context("Failed to read back app classification")?;

        Ok(row)
    }

    pub fn delete_classification(&self, id: i64) -> Result<bool> {
        // Seeded defaults stay; only user-defined rows are deletable.
        let deleted = self
            .conn
            .execute(
                "DELETE FROM app_classifications WHERE id = ?1 AND is_custom = 1",
                params![id],
            )
            .context("Failed to delete app classification")?;

        Ok(deleted > 0)
    }

    pub fn seed_default_classifications(&self) -> Result<usize> {
        let existing: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM app_classifications", [], |row| {
                row.get(0)
            })
            .context("Failed to count app classifications")?;

        if existing > 0 {
            return Ok(0);
        }

        let seeds: Vec<ClassificationInput> = serde_json::from_str(SEED_CLASSIFICATIONS)
            .context("Failed to parse bundled classification seeds")?;

        seeds
            .iter()
            .try_for_each(|seed| self.upsert_classification(seed, false).map(|_| ()))?;

        Ok(seeds.len())
    }
}

#[cfg(test)]
mod tests {
    use super::ClassificationInput;
    use crate::db::{AttentionState, open_test_db};

    #[test]
    fn defaults_are_seeded_once() {
        let (database, _dir) = open_test_db();
        let seeded = database.list_classifications().expect("list");
        assert!(!seeded.is_empty());
        assert!(seeded.iter().all(|row| !row.is_custom));

        assert_eq!(database.seed_default_classifications().expect("reseed"), 0);
    }

    #[test]
    fn upsert_replaces_by_app_and_bundle() {
        let (database, _dir) = open_test_db();
        let input = ClassificationInput {
            app_name: "Obsidian".to_string(),
            bundle_id: Some("md.obsidian".to_string()),
            default_state: AttentionState::Green,
            keyword_rules: vec!["!daily note".to_string()],
        };

        let first = database.upsert_classification(&input, true).expect("upsert");
        let second = database
            .upsert_classification(
                &ClassificationInput {
                    default_state: AttentionState::Amber,
                    ..input.clone()
                },
                true,
            )
            .expect("upsert");

        assert_eq!(first.id, second.id);
        assert_eq!(second.default_state, AttentionState::Amber);
        assert_eq!(second.keyword_rules, vec!["!daily note".to_string()]);
    }

    #[test]
    fn delete_only_removes_custom_rows() {
        let (database, _dir) = open_test_db();
        let seeded = database.list_classifications().expect("list");
        assert!(!database.delete_classification(seeded[0].id).expect("delete"));

        let custom = database
            .upsert_classification(
                &ClassificationInput {
                    app_name: "Figma".to_string(),
                    bundle_id: None,
                    default_state: AttentionState::Green,
                    keyword_rules: Vec::new(),
                },
                true,
            )
            .expect("upsert");
        assert!(database.delete_classification(custom.id).expect("delete"));
    }
}
