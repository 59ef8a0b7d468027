use crate::db::Database;
use crate::db::intervals::StateSummary;
use crate::db::scores::DailyScoreInput;
use anyhow::Result;
use chrono::{Duration, NaiveDate};
use serde::Serialize;

const STREAK_THRESHOLD: i64 = 50;

#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub date: NaiveDate,
    pub summary: StateSummary,
    pub tasks_completed: i64,
    pub tasks_total: i64,
    pub signal_ratio: f64,
    pub task_completion_ratio: f64,
    pub streak_days: i64,
    pub streak_bonus: i64,
    pub final_score: i64,
}

pub fn calculate_score(database: &Database, date: NaiveDate) -> Result<ScoreBreakdown> {
    let summary = database.interval_summary_for_date(date)?;
    let signal_ratio = if summary.total_minutes == 0 {
        0.0
    } else {
        summary.signal_minutes as f64 / summary.total_minutes as f64
    };

    let (tasks_completed, tasks_total) = database.task_completion_for_date(date)?;
    let task_completion_ratio = if tasks_total == 0 {
        0.0
    } else {
        tasks_completed as f64 / tasks_total as f64
    };

    let streak_days = streak_for_date(database, date)?;
    let streak_bonus = streak_bonus(streak_days);

    let weighted = signal_ratio * 100.0 * 0.6
        + task_completion_ratio * 100.0 * 0.3
        + streak_bonus as f64 * 0.1;
    let final_score = (weighted.round() as i64).min(100);

    Ok(ScoreBreakdown {
        date,
        summary,
        tasks_completed,
        tasks_total,
        signal_ratio,
        task_completion_ratio,
        streak_days,
        streak_bonus,
        final_score,
    })
}

pub fn save_score(database: &Database, date: NaiveDate, now: i64) -> Result<ScoreBreakdown> {
    let breakdown = calculate_score(database, date)?;

    database.upsert_daily_score(
        &DailyScoreInput {
            date,
            signal_minutes: breakdown.summary.signal_minutes,
            adjacent_minutes: breakdown.summary.adjacent_minutes,
            noise_minutes: breakdown.summary.noise_minutes,
            total_minutes: breakdown.summary.total_minutes,
            tasks_completed: breakdown.tasks_completed,
            tasks_total: breakdown.tasks_total,
            score: breakdown.final_score,
            streak_days: breakdown.streak_days,
        },
        now,
    )?;

    Ok(breakdown)
}

// A streak only continues from scores that were actually persisted: yesterday's
// stored row carries it forward, and a same-day stored row above the threshold
// bootstraps a fresh one.
fn streak_for_date(database: &Database, date: NaiveDate) -> Result<i64> {
    if let Some(yesterday) = database.score_for_date(date - Duration::days(1))? {
        if yesterday.score >= STREAK_THRESHOLD {
            return Ok(yesterday.streak_days + 1);
        }
    }

    let stored_today = database.score_for_date(date)?;
    Ok(match stored_today {
        Some(row) if row.score >= STREAK_THRESHOLD => 1,
        _ => 0,
    })
}

pub fn streak_bonus(streak_days: i64) -> i64 {
    match streak_days {
        days if days >= 30 => 10,
        days if days >= 14 => 7,
        days if days >= 7 => 5,
        days if days >= 3 => 3,
        days if days >= 1 => 1,
        _ => 0,
    }
}
