use crate::db::{Database, TaskStatus};
use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use rusqlite::{Row, params, params_from_iter};
use serde::{Deserialize, Serialize};

const TASK_COLUMNS: &str = "id, title, description, goal_id, category_id, status, priority, rationale, \
     scheduled_date, start_date, end_date, estimated_days, days_worked, last_worked_date, \
     completed_at, created_at, updated_at";

#[derive(Debug, Clone, Serialize)]
pub struct TaskRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub goal_id: Option<i64>,
    pub category_id: Option<i64>,
    pub status: TaskStatus,
    pub priority: i64,
    pub rationale: Option<String>,
    pub scheduled_date: NaiveDate,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub estimated_days: i64,
    pub days_worked: i64,
    pub last_worked_date: Option<NaiveDate>,
    pub completed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaskInput {
    pub title: String,
    pub description: Option<String>,
    pub goal_id: Option<i64>,
    pub category_id: Option<i64>,
    pub priority: i64,
    pub rationale: Option<String>,
    pub scheduled_date: NaiveDate,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub estimated_days: i64,
}

impl Default for TaskInput {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: None,
            goal_id: None,
            category_id: None,
            priority: 3,
            rationale: None,
            scheduled_date: NaiveDate::default(),
            start_date: None,
            end_date: None,
            estimated_days: 1,
        }
    }
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<TaskRow> {
    let status: String = row.get(5)?;

    Ok(TaskRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        goal_id: row.get(3)?,
        category_id: row.get(4)?,
        status: TaskStatus::parse(&status).unwrap_or(TaskStatus::Pending),
        priority: row.get(6)?,
        rationale: row.get(7)?,
        scheduled_date: row.get(8)?,
        start_date: row.get(9)?,
        end_date: row.get(10)?,
        estimated_days: row.get(11)?,
        days_worked: row.get(12)?,
        last_worked_date: row.get(13)?,
        completed_at: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

impl Database {
    pub fn create_task(&self, input: &TaskInput, now: i64) -> Result<TaskRow> {
        let priority = input.priority.clamp(1, 5);
        let estimated_days = input.estimated_days.max(1);
        let start_date = input.start_date.unwrap_or(input.scheduled_date);

        self.conn
            .execute(
                "INSERT INTO tasks (title, description, goal_id, category_id, status, priority, rationale, \
                 scheduled_date, start_date, end_date, estimated_days, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                params![
                    input.title,
                    input.description,
                    input.goal_id,
                    input.category_id,
                    priority,
                    input.rationale,
                    input.scheduled_date,
                    start_date,
                    input.end_date,
                    estimated_days,
                    now,
                ],
            )
            .context("Failed to insert task")?;

        let id = self.conn.last_insert_rowid();
        self.task(id)?.context("Task row missing after insert")
    }

    pub fn task(&self, id: i64) -> Result<Option<TaskRow>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                task_from_row,
            )
            .ok();

        Ok(row)
    }

    pub fn update_task(&self, id: i64, input: &TaskInput, now: i64) -> Result<Option<TaskRow>> {
        let priority = input.priority.clamp(1, 5);
        let estimated_days = input.estimated_days.max(1);
        let start_date = input.start_date.unwrap_or(input.scheduled_date);

        let updated = self
            .conn
            .execute(
                "UPDATE tasks SET title = ?2, description = ?3, goal_id = ?4, category_id = ?5, \
                 priority = ?6, rationale = ?7, scheduled_date = ?8, start_date = ?9, end_date = ?10, \
                 estimated_days = ?11, updated_at = ?12 WHERE id = ?1",
                params![
                    id,
                    input.title,
                    input.description,
                    input.goal_id,
                    input.category_id,
                    priority,
                    input.rationale,
                    input.scheduled_date,
                    start_date,
                    input.end_date,
                    estimated_days,
                    now,
                ],
            )
            .context("Failed to update task")?;

        if updated == 0 {
            return Ok(None);
        }

        self.task(id)
    }

    pub fn delete_task(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])
            .context("Failed to delete task")?;

        Ok(deleted > 0)
    }

    pub fn active_task(&self) -> Result<Option<TaskRow>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE status = 'in_progress' LIMIT 1"),
                [],
                task_from_row,
            )
            .ok();

        Ok(row)
    }

    pub fn start_task(&mut self, id: i64, now: i64) -> Result<Option<TaskRow>> {
        let transaction = self
            .conn
            .transaction()
            .context("Failed to start transaction")?;

        // Only one task may be in_progress: starting demotes any other to pending.
        transaction
            .execute(
                "UPDATE tasks SET status = 'pending', updated_at = ?2 \
                 WHERE status = 'in_progress' AND id <> ?1",
                params![id, now],
            )
            .context("Failed to demote running task")?;

        let started = transaction
            .execute(
                "UPDATE tasks SET status = 'in_progress', updated_at = ?2 \
                 WHERE id = ?1 AND status IN ('pending', 'in_progress', 'deferred')",
                params![id, now],
            )
            .context("Failed to start task")?;

        if started == 0 {
            // Unknown or completed task: roll everything back, a no-op start must not demote.
            drop(transaction);
            return Ok(None);
        }

        transaction.commit().context("Failed to commit task start")?;
        self.task(id)
    }

    pub fn complete_task(&self, id: i64, now: i64) -> Result<Option<TaskRow>> {
        self.conn
            .execute(
                "UPDATE tasks SET status = 'completed', completed_at = COALESCE(completed_at, ?2), \
                 updated_at = ?2 WHERE id = ?1 AND status <> 'completed'",
                params![id, now],
            )
            .context("Failed to complete task")?;

        self.task(id)
    }

    pub fn defer_task(&self, id: i64, today: NaiveDate, now: i64) -> Result<Option<TaskRow>> {
        let tomorrow = today + Duration::days(1);

        let deferred = self
            .conn
            .execute(
                "UPDATE tasks SET status = 'deferred', scheduled_date = ?2, updated_at = ?3 \
                 WHERE id = ?1 AND status IN ('pending', 'in_progress')",
                params![id, tomorrow, now],
            )
            .context("Failed to defer task")?;

        if deferred == 0 {
            return Ok(None);
        }

        self.task(id)
    }

    pub fn signal_queue(&self, today: NaiveDate, limit: usize) -> Result<Vec<TaskRow>> {
        let limit = limit.clamp(3, 5);
        let yesterday = today - Duration::days(1);

        let mut statement = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE status IN ('pending', 'in_progress') \
               AND (scheduled_date <= ?1 \
                    OR (start_date <= ?1 AND (end_date IS NULL OR end_date >= ?1))) \
             ORDER BY CASE status WHEN 'in_progress' THEN 0 ELSE 1 END, \
                      priority ASC, \
                      CASE WHEN last_worked_date = ?2 THEN 0 ELSE 1 END, \
                      start_date ASC \
             LIMIT ?3"
        ))?;

        let rows = statement
            .query_map(params![today, yesterday, limit as i64], task_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query signal queue")?;

        Ok(rows)
    }

    pub fn backlog(&self, exclude_ids: &[i64]) -> Result<Vec<TaskRow>> {
        let order = "ORDER BY priority ASC, start_date ASC, created_at DESC";
        let sql = if exclude_ids.is_empty() {
            format!(
                "SELECT {TASK_COLUMNS} FROM tasks \
                 WHERE status IN ('pending', 'in_progress') {order}"
            )
        } else {
            let placeholders = exclude_ids
                .iter()
                .map(|_| "?")
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "SELECT {TASK_COLUMNS} FROM tasks \
                 WHERE status IN ('pending', 'in_progress') AND id NOT IN ({placeholders}) {order}"
            )
        };

        let mut statement = self.conn.prepare(&sql)?;
        let rows = statement
            .query_map(params_from_iter(exclude_ids.iter()), task_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query backlog")?;

        Ok(rows)
    }

    pub fn record_work(&self, id: i64, today: NaiveDate, now: i64) -> Result<Option<TaskRow>> {
        // days_worked advances at most once per calendar day.
        self.conn
            .execute(
                "UPDATE tasks SET days_worked = days_worked + 1, last_worked_date = ?2, updated_at = ?3 \
                 WHERE id = ?1 AND (last_worked_date IS NULL OR last_worked_date <> ?2)",
                params![id, today, now],
            )
            .context("Failed to record work")?;

        self.task(id)
    }

    pub fn reorder_signal_queue(&mut self, ordered_ids: &[i64], now: i64) -> Result<()> {
        let transaction = self
            .conn
            .transaction()
            .context("Failed to start transaction")?;

        ordered_ids
            .iter()
            .enumerate()
            .try_for_each(|(position, id)| {
                transaction
                    .execute(
                        "UPDATE tasks SET priority = ?2, updated_at = ?3 WHERE id = ?1",
                        params![id, (position + 1).min(5) as i64, now],
                    )
                    .context("Failed to reorder task")
                    .map(|_| ())
            })?;

        transaction
            .commit()
            .context("Failed to commit queue reorder")
    }

    pub fn incomplete_by_category(&self, category_id: i64) -> Result<Vec<TaskRow>> {
        let mut statement = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE status IN ('pending', 'in_progress') AND category_id = ?1 \
             ORDER BY priority ASC, start_date ASC"
        ))?;

        let rows = statement
            .query_map(params![category_id], task_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query tasks by category")?;

        Ok(rows)
    }

    pub fn tasks_worked_on(&self, date: NaiveDate) -> Result<Vec<TaskRow>> {
        let mut statement = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE last_worked_date = ?1 \
             ORDER BY priority ASC, start_date ASC"
        ))?;

        let rows = statement
            .query_map(params![date], task_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query worked tasks")?;

        Ok(rows)
    }

    pub fn task_completion_for_date(&self, date: NaiveDate) -> Result<(i64, i64)> {
        let (completed, total) = self
            .conn
            .query_row(
                "SELECT COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0), COUNT(*) \
                 FROM tasks WHERE scheduled_date = ?1",
                params![date],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .context("Failed to count scheduled tasks")?;

        Ok((completed, total))
    }
}

#[cfg(test)]
mod tests {
    use super::TaskInput;
    use crate::db::{TaskStatus, open_test_db};
    use chrono::{Duration, NaiveDate};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn input(title: &str, priority: i64, scheduled: NaiveDate) -> TaskInput {
        TaskInput {
            title: title.to_string(),
            priority,
            scheduled_date: scheduled,
            ..Default::default()
        }
    }

    #[test]
    fn start_keeps_a_single_task_in_progress() {
        let (mut database, _dir) = open_test_db();
        let today = date(2026, 3, 2);
        let first = database.create_task(&input("a", 1, today), 10).expect("task");
        let second = database.create_task(&input("b", 2, today), 11).expect("task");

        database.start_task(first.id, 20).expect("start").expect("present");
        database.start_task(second.id, 30).expect("start").expect("present");

        let running = database
            .backlog(&[])
            .expect("tasks")
            .into_iter()
            .filter(|task| task.status == TaskStatus::InProgress)
            .collect::<Vec<_>>();

        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, second.id);
        let demoted = database.task(first.id).expect("query").expect("present");
        assert_eq!(demoted.status, TaskStatus::Pending);
    }

    #[test]
    fn start_of_unknown_task_is_a_noop() {
        let (mut database, _dir) = open_test_db();
        let today = date(2026, 3, 2);
        let task = database.create_task(&input("a", 1, today), 10).expect("task");
        database.start_task(task.id, 20).expect("start");

        assert!(database.start_task(9999, 30).expect("start").is_none());
        let still_running = database.task(task.id).expect("query").expect("present");
        assert_eq!(still_running.status, TaskStatus::InProgress);
    }

    #[test]
    fn completed_task_cannot_be_restarted() {
        let (mut database, _dir) = open_test_db();
        let today = date(2026, 3, 2);
        let task = database.create_task(&input("a", 1, today), 10).expect("task");

        let done = database.complete_task(task.id, 20).expect("complete").expect("present");
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.completed_at, Some(20));

        assert!(database.start_task(task.id, 30).expect("start").is_none());

        // completed_at is written exactly once
        let again = database.complete_task(task.id, 40).expect("complete").expect("present");
        assert_eq!(again.completed_at, Some(20));
    }

    #[test]
    fn defer_moves_schedule_forward_one_day() {
        let (database, _dir) = open_test_db();
        let today = date(2026, 3, 2);
        let task = database.create_task(&input("a", 1, today), 10).expect("task");

        let deferred = database
            .defer_task(task.id, today, 20)
            .expect("defer")
            .expect("present");
        assert_eq!(deferred.status, TaskStatus::Deferred);
        assert_eq!(deferred.scheduled_date, today + Duration::days(1));

        assert!(database.defer_task(9999, today, 30).expect("defer").is_none());
        assert!(database.defer_task(task.id, today, 30).expect("defer").is_none());
    }

    #[test]
    fn signal_queue_ranks_in_progress_before_priority() {
        let (mut database, _dir) = open_test_db();
        let today = date(2026, 3, 2);
        let urgent = database.create_task(&input("urgent", 1, today), 10).expect("task");
        let running = database.create_task(&input("running", 5, today), 11).expect("task");
        database.start_task(running.id, 20).expect("start");

        let queue = database.signal_queue(today, 5).expect("queue");
        assert_eq!(queue[0].id, running.id);
        assert_eq!(queue[1].id, urgent.id);
    }

    #[test]
    fn signal_queue_prefers_yesterday_continuity_on_priority_tie() {
        let (database, _dir) = open_test_db();
        let today = date(2026, 3, 2);
        let yesterday = today - Duration::days(1);
        let fresh = database.create_task(&input("fresh", 3, today), 10).expect("task");
        let carried = database.create_task(&input("carried", 3, today), 11).expect("task");
        database
            .record_work(carried.id, yesterday, 12)
            .expect("work")
            .expect("present");

        let queue = database.signal_queue(today, 5).expect("queue");
        assert_eq!(queue[0].id, carried.id);
        assert_eq!(queue[1].id, fresh.id);
    }

    #[test]
    fn signal_queue_includes_overdue_and_multi_day_spans() {
        let (database, _dir) = open_test_db();
        let today = date(2026, 3, 2);

        let overdue = database
            .create_task(&input("overdue", 2, today - Duration::days(3)), 10)
            .expect("task");
        let spanning = database
            .create_task(
                &TaskInput {
                    title: "spanning".to_string(),
                    priority: 3,
                    scheduled_date: today + Duration::days(2),
                    start_date: Some(today - Duration::days(1)),
                    end_date: Some(today + Duration::days(2)),
                    ..Default::default()
                },
                11,
            )
            .expect("task");
        let future = database
            .create_task(&input("future", 1, today + Duration::days(1)), 12)
            .expect("task");

        let queue = database.signal_queue(today, 5).expect("queue");
        let ids = queue.iter().map(|task| task.id).collect::<Vec<_>>();
        assert!(ids.contains(&overdue.id));
        assert!(ids.contains(&spanning.id));
        assert!(!ids.contains(&future.id));
    }

    #[test]
    fn signal_queue_limit_is_clamped() {
        let (database, _dir) = open_test_db();
        let today = date(2026, 3, 2);
        for index in 0..8 {
            database
                .create_task(&input(&format!("task-{index}"), 3, today), 10 + index)
                .expect("task");
        }

        assert_eq!(database.signal_queue(today, 99).expect("queue").len(), 5);
        assert_eq!(database.signal_queue(today, 0).expect("queue").len(), 3);
    }

    #[test]
    fn backlog_excludes_queue_and_completed() {
        let (database, _dir) = open_test_db();
        let today = date(2026, 3, 2);
        let queued = database.create_task(&input("queued", 1, today), 10).expect("task");
        let rest = database.create_task(&input("rest", 2, today), 11).expect("task");
        let done = database.create_task(&input("done", 1, today), 12).expect("task");
        database.complete_task(done.id, 20).expect("complete");

        let backlog = database.backlog(&[queued.id]).expect("backlog");
        let ids = backlog.iter().map(|task| task.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![rest.id]);
    }

    #[test]
    fn record_work_is_idempotent_per_day() {
        let (database, _dir) = open_test_db();
        let today = date(2026, 3, 2);
        let task = database.create_task(&input("a", 3, today), 10).expect("task");

        let first = database
            .record_work(task.id, today, 20)
            .expect("work")
            .expect("present");
        assert_eq!(first.days_worked, 1);
        assert_eq!(first.last_worked_date, Some(today));

        let second = database
            .record_work(task.id, today, 30)
            .expect("work")
            .expect("present");
        assert_eq!(second.days_worked, 1);

        let next_day = database
            .record_work(task.id, today + Duration::days(1), 40)
            .expect("work")
            .expect("present");
        assert_eq!(next_day.days_worked, 2);

        assert!(database.record_work(9999, today, 50).expect("work").is_none());
    }

    #[test]
    fn reorder_assigns_priorities_by_position() {
        let (mut database, _dir) = open_test_db();
        let today = date(2026, 3, 2);
        let first = database.create_task(&input("a", 5, today), 10).expect("task");
        let second = database.create_task(&input("b", 1, today), 11).expect("task");

        database
            .reorder_signal_queue(&[first.id, second.id], 20)
            .expect("reorder");

        assert_eq!(database.task(first.id).expect("query").expect("present").priority, 1);
        assert_eq!(database.task(second.id).expect("query").expect("present").priority, 2);

        // unknown ids inside the batch are skipped, known ones still apply
        database
            .reorder_signal_queue(&[9999, second.id], 30)
            .expect("reorder");
        assert_eq!(database.task(second.id).expect("query").expect("present").priority, 2);
    }

    #[test]
    fn completion_counts_for_scheduled_date() {
        let (database, _dir) = open_test_db();
        let today = date(2026, 3, 2);
        let done = database.create_task(&input("done", 1, today), 10).expect("task");
        database.create_task(&input("open", 2, today), 11).expect("task");
        database
            .create_task(&input("elsewhere", 2, today + Duration::days(1)), 12)
            .expect("task");
        database.complete_task(done.id, 20).expect("complete");

        assert_eq!(database.task_completion_for_date(today).expect("counts"), (1, 2));
        assert_eq!(
            database
                .task_completion_for_date(today - Duration::days(5))
                .expect("counts"),
            (0, 0)
        );
    }
}
