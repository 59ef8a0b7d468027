use crate::db::Database;
use crate::db::classifications::ClassificationRow;
use anyhow::Result;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::warn;

pub struct ClassificationCache {
    entries: HashMap<String, ClassificationRow>,
    loaded_at: Option<Instant>,
    ttl: Duration,
}

impl ClassificationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            loaded_at: None,
            ttl,
        }
    }

    pub fn refresh(&mut self, database: &Database) -> Result<()> {
        let fresh = self
            .loaded_at
            .map(|loaded| loaded.elapsed() < self.ttl)
            .unwrap_or(false);
        if fresh {
            return Ok(());
        }

        match database.list_classifications() {
            Ok(rows) => {
                let mut entries = HashMap::with_capacity(rows.len() * 2);
                for row in rows {
                    if let Some(bundle_id) = &row.bundle_id {
                        entries.insert(bundle_id.to_lowercase(), row.clone());
                    }
                    entries.insert(row.app_name.to_lowercase(), row);
                }
                self.entries = entries;
                self.loaded_at = Some(Instant::now());
            }
            Err(error) => {
                // Stale entries keep serving until a later refresh succeeds.
                warn!(error = %error, "failed to reload app classifications");
            }
        }

        Ok(())
    }

    pub fn invalidate(&mut self) {
        self.loaded_at = None;
    }

    pub fn lookup(&self, key: &str) -> Option<&ClassificationRow> {
        self.entries.get(&key.trim().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::ClassificationCache;
    use crate::db::classifications::ClassificationInput;
    use crate::db::{AttentionState, open_test_db};
    use std::time::Duration;

    #[test]
    fn refresh_loads_app_and_bundle_keys() {
        let (database, _dir) = open_test_db();
        let mut cache = ClassificationCache::new(Duration::from_secs(3600));
        cache.refresh(&database).expect("refresh");

        let by_name = cache.lookup("visual studio code").expect("by app name");
        assert_eq!(by_name.default_state, AttentionState::Green);
        assert!(cache.lookup("com.microsoft.VSCode").is_some());
        assert!(cache.lookup("No Such App").is_none());
    }

    #[test]
    fn refresh_within_ttl_serves_stale_entries() {
        let (database, _dir) = open_test_db();
        let mut cache = ClassificationCache::new(Duration::from_secs(3600));
        cache.refresh(&database).expect("refresh");

        database
            .upsert_classification(
                &ClassificationInput {
                    app_name: "Aseprite".to_string(),
                    bundle_id: None,
                    default_state: AttentionState::Green,
                    keyword_rules: Vec::new(),
                },
                true,
            )
            .expect("upsert");

        cache.refresh(&database).expect("refresh");
        assert!(cache.lookup("aseprite").is_none());

        cache.invalidate();
        cache.refresh(&database).expect("refresh");
        assert!(cache.lookup("aseprite").is_some());
    }
}
