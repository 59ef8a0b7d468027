use crate::db::{AttentionState, Database, day_bounds};
use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate};
use rusqlite::{Row, params};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
pub struct IntervalRow {
    pub id: i64,
    pub started_at: i64,
    pub app_name: String,
    pub window_title: Option<String>,
    pub bundle_id: Option<String>,
    pub url: Option<String>,
    pub state: AttentionState,
    pub duration_sec: i64,
    pub task_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct IntervalInput {
    pub started_at: i64,
    pub app_name: String,
    pub window_title: Option<String>,
    pub bundle_id: Option<String>,
    pub url: Option<String>,
    pub state: AttentionState,
    pub task_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StateSummary {
    pub signal_minutes: i64,
    pub adjacent_minutes: i64,
    pub noise_minutes: i64,
    pub total_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppBreakdownEntry {
    pub app_name: String,
    pub minutes: i64,
    pub state: AttentionState,
}

fn interval_from_row(row: &Row<'_>) -> rusqlite::Result<IntervalRow> {
    let state: String = row.get(6)?;

    Ok(IntervalRow {
        id: row.get(0)?,
        started_at: row.get(1)?,
        app_name: row.get(2)?,
        window_title: row.get(3)?,
        bundle_id: row.get(4)?,
        url: row.get(5)?,
        state: AttentionState::parse(&state).unwrap_or(AttentionState::Amber),
        duration_sec: row.get(7)?,
        task_id: row.get(8)?,
    })
}

impl Database {
    pub fn append_interval(&self, input: &IntervalInput) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO activity_intervals \
                 (started_at, app_name, window_title, bundle_id, url, state, duration_sec, task_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
                params![
                    input.started_at,
                    input.app_name,
                    input.window_title,
                    input.bundle_id,
                    input.url,
                    input.state.as_str(),
                    input.task_id,
                ],
            )
            .context("Failed to append activity interval")?;

        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_interval_duration(&self, id: i64, duration_sec: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE activity_intervals SET duration_sec = ?2 WHERE id = ?1",
                params![id, duration_sec.max(0)],
            )
            .context("Failed to finalize interval duration")?;

        Ok(())
    }

    pub fn latest_interval_timestamp(&self) -> Result<Option<i64>> {
        let timestamp = self
            .conn
            .query_row(
                "SELECT started_at FROM activity_intervals ORDER BY started_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .ok();

        Ok(timestamp)
    }

    pub fn intervals_for_date(&self, date: NaiveDate) -> Result<Vec<IntervalRow>> {
        let (from_ts, to_ts) = day_bounds(date)?;

        let mut statement = self.conn.prepare(
            "SELECT id, started_at, app_name, window_title, bundle_id, url, state, duration_sec, task_id \
             FROM activity_intervals \
             WHERE started_at >= ?1 AND started_at <= ?2 \
             ORDER BY started_at ASC",
        )?;

        let rows = statement
            .query_map(params![from_ts, to_ts], interval_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query intervals")?;

        Ok(rows)
    }

    pub fn interval_summary_for_date(&self, date: NaiveDate) -> Result<StateSummary> {
        let (from_ts, to_ts) = day_bounds(date)?;

        let (green_sec, amber_sec, red_sec) = self
            .conn
            .query_row(
                "SELECT \
                   COALESCE(SUM(CASE WHEN state = 'green' THEN duration_sec ELSE 0 END), 0), \
                   COALESCE(SUM(CASE WHEN state = 'amber' THEN duration_sec ELSE 0 END), 0), \
                   COALESCE(SUM(CASE WHEN state = 'red' THEN duration_sec ELSE 0 END), 0) \
                 FROM activity_intervals WHERE started_at >= ?1 AND started_at <= ?2",
                params![from_ts, to_ts],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .context("Failed to summarize intervals")?;

        Ok(StateSummary {
            signal_minutes: green_sec / 60,
            adjacent_minutes: amber_sec / 60,
            noise_minutes: red_sec / 60,
            total_minutes: (green_sec + amber_sec + red_sec) / 60,
        })
    }

    pub fn app_breakdown_for_date(&self, date: NaiveDate) -> Result<Vec<AppBreakdownEntry>> {
        let (from_ts, to_ts) = day_bounds(date)?;

        let mut statement = self.conn.prepare(
            "SELECT app_name, state, SUM(duration_sec) \
             FROM activity_intervals \
             WHERE started_at >= ?1 AND started_at <= ?2 \
             GROUP BY app_name, state",
        )?;

        let grouped = statement
            .query_map(params![from_ts, to_ts], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query app breakdown")?;

        // One entry per app: total minutes across states, labeled with the dominant state.
        let mut per_app: HashMap<String, (i64, AttentionState, i64)> = HashMap::new();
        for (app_name, state, seconds) in grouped {
            let state = AttentionState::parse(&state).unwrap_or(AttentionState::Amber);
            let entry = per_app
                .entry(app_name)
                .or_insert((0, AttentionState::Amber, -1));
            entry.0 += seconds;
            if seconds > entry.2 {
                entry.1 = state;
                entry.2 = seconds;
            }
        }

        let mut entries = per_app
            .into_iter()
            .map(|(app_name, (total_sec, state, _))| AppBreakdownEntry {
                app_name,
                minutes: total_sec / 60,
                state,
            })
            .collect::<Vec<_>>();

        entries.sort_by(|left, right| {
            right
                .minutes
                .cmp(&left.minutes)
                .then_with(|| left.app_name.cmp(&right.app_name))
        });

        Ok(entries)
    }

    pub fn cleanup_old_intervals(&self, retention_days: u32) -> Result<usize> {
        let threshold = (Local::now() - Duration::days(i64::from(retention_days))).timestamp();

        let deleted = self
            .conn
            .execute(
                "DELETE FROM activity_intervals WHERE started_at < ?1",
                params![threshold],
            )
            .context("Failed to clean up old intervals")?;

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::IntervalInput;
    use crate::db::{AttentionState, day_bounds, open_test_db};
    use chrono::NaiveDate;

    fn interval(started_at: i64, app: &str, state: AttentionState) -> IntervalInput {
        IntervalInput {
            started_at,
            app_name: app.to_string(),
            window_title: None,
            bundle_id: None,
            url: None,
            state,
            task_id: None,
        }
    }

    #[test]
    fn append_then_finalize_updates_duration() {
        let (database, _dir) = open_test_db();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).expect("date");
        let (from_ts, _) = day_bounds(date).expect("bounds");

        let id = database
            .append_interval(&interval(from_ts + 10, "Zed", AttentionState::Green))
            .expect("append");
        database.update_interval_duration(id, 300).expect("finalize");

        let rows = database.intervals_for_date(date).expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].duration_sec, 300);
        assert_eq!(rows[0].state, AttentionState::Green);
    }

    #[test]
    fn summary_buckets_states_into_minutes() {
        let (database, _dir) = open_test_db();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).expect("date");
        let (from_ts, _) = day_bounds(date).expect("bounds");

        for (offset, app, state, seconds) in [
            (0, "Zed", AttentionState::Green, 600),
            (700, "Slack", AttentionState::Amber, 180),
            (900, "YouTube", AttentionState::Red, 240),
        ] {
            let id = database
                .append_interval(&interval(from_ts + offset, app, state))
                .expect("append");
            database.update_interval_duration(id, seconds).expect("finalize");
        }

        let summary = database.interval_summary_for_date(date).expect("summary");
        assert_eq!(summary.signal_minutes, 10);
        assert_eq!(summary.adjacent_minutes, 3);
        assert_eq!(summary.noise_minutes, 4);
        assert_eq!(summary.total_minutes, 17);
    }

    #[test]
    fn summary_of_empty_day_is_zero() {
        let (database, _dir) = open_test_db();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).expect("date");

        let summary = database.interval_summary_for_date(date).expect("summary");
        assert_eq!(summary.total_minutes, 0);
        assert_eq!(summary.signal_minutes, 0);
    }

    #[test]
    fn app_breakdown_labels_dominant_state() {
        let (database, _dir) = open_test_db();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).expect("date");
        let (from_ts, _) = day_bounds(date).expect("bounds");

        for (offset, state, seconds) in [
            (0, AttentionState::Green, 1200),
            (1300, AttentionState::Amber, 120),
        ] {
            let id = database
                .append_interval(&interval(from_ts + offset, "Zed", state))
                .expect("append");
            database.update_interval_duration(id, seconds).expect("finalize");
        }

        let breakdown = database.app_breakdown_for_date(date).expect("breakdown");
        assert_eq!(breakdown.len(), 1);
        assert_eq!(breakdown[0].app_name, "Zed");
        assert_eq!(breakdown[0].minutes, 22);
        assert_eq!(breakdown[0].state, AttentionState::Green);
    }
}
