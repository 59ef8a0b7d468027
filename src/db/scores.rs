use crate::db::Database;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Row, params};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct DailyScoreRow {
    pub id: i64,
    pub date: NaiveDate,
    pub signal_minutes: i64,
    pub adjacent_minutes: i64,
    pub noise_minutes: i64,
    pub total_minutes: i64,
    pub tasks_completed: i64,
    pub tasks_total: i64,
    pub score: i64,
    pub streak_days: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct DailyScoreInput {
    pub date: NaiveDate,
    pub signal_minutes: i64,
    pub adjacent_minutes: i64,
    pub noise_minutes: i64,
    pub total_minutes: i64,
    pub tasks_completed: i64,
    pub tasks_total: i64,
    pub score: i64,
    pub streak_days: i64,
}

fn score_from_row(row: &Row<'_>) -> rusqlite::Result<DailyScoreRow> {
    Ok(DailyScoreRow {
        id: row.get(0)?,
        date: row.get(1)?,
        signal_minutes: row.get(2)?,
        adjacent_minutes: row.get(3)?,
        noise_minutes: row.get(4)?,
        total_minutes: row.get(5)?,
        tasks_completed: row.get(6)?,
        tasks_total: row.get(7)?,
        score: row.get(8)?,
        streak_days: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

const SCORE_COLUMNS: &str = "id, date, signal_minutes, adjacent_minutes, noise_minutes, \
     total_minutes, tasks_completed, tasks_total, score, streak_days, updated_at";

impl Database {
    pub fn score_for_date(&self, date: NaiveDate) -> Result<Option<DailyScoreRow>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {SCORE_COLUMNS} FROM daily_scores WHERE date = ?1"),
                params![date],
                score_from_row,
            )
            .ok();

        Ok(row)
    }

    pub fn recent_scores(&self, limit: usize) -> Result<Vec<DailyScoreRow>> {
        let mut statement = self.conn.prepare(&format!(
            "SELECT {SCORE_COLUMNS} FROM daily_scores ORDER BY date DESC LIMIT ?1"
        ))?;

        let rows = statement
            .query_map(params![limit as i64], score_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query recent scores")?;

        Ok(rows)
    }

    pub fn upsert_daily_score(&self, input: &DailyScoreInput, now: i64) -> Result<DailyScoreRow> {
        self.conn
            .execute(
                "INSERT INTO daily_scores \
                 (date, signal_minutes, adjacent_minutes, noise_minutes, total_minutes, \
                  tasks_completed, tasks_total, score, streak_days, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
                 ON CONFLICT(date) \
                 DO UPDATE SET signal_minutes = excluded.signal_minutes, \
                               adjacent_minutes = excluded.adjacent_minutes, \
                               noise_minutes = excluded.noise_minutes, \
                               total_minutes = excluded.total_minutes, \
                               tasks_completed = excluded.tasks_completed, \
                               tasks_total = excluded.tasks_total, \
                               score = excluded.score, \
                               streak_days = excluded.streak_days, \
                               updated_at = excluded.updated_at",
                params![
                    input.date,
                    input.signal_minutes,
                    input.adjacent_minutes,
                    input.noise_minutes,
                    input.total_minutes,
                    input.tasks_completed,
                    input.tasks_total,
                    input.score,
                    input.streak_days,
                    now,
                ],
            )
            .context("Failed to upsert daily score")?;

        self.score_for_date(input.date)?
            .context("Daily score missing after upsert")
    }
}

#[cfg(test)]
mod tests {
    use super::DailyScoreInput;
    use crate::db::open_test_db;
    use chrono::NaiveDate;

    fn score_input(date: NaiveDate, score: i64) -> DailyScoreInput {
        DailyScoreInput {
            date,
            signal_minutes: 90,
            adjacent_minutes: 30,
            noise_minutes: 15,
            total_minutes: 135,
            tasks_completed: 2,
            tasks_total: 3,
            score,
            streak_days: 1,
        }
    }

    #[test]
    fn upsert_is_idempotent_per_date() {
        let (database, _dir) = open_test_db();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).expect("date");

        let first = database
            .upsert_daily_score(&score_input(date, 70), 100)
            .expect("upsert");
        let second = database
            .upsert_daily_score(&score_input(date, 75), 200)
            .expect("upsert");

        assert_eq!(first.id, second.id);
        assert_eq!(second.score, 75);
        assert_eq!(second.updated_at, 200);
        assert_eq!(database.recent_scores(10).expect("recent").len(), 1);
    }
}
