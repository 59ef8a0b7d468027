use crate::classifier::cache::ClassificationCache;
use crate::config::Config;
use crate::daemon;
use crate::db::Database;
use crate::db::classifications::ClassificationInput;
use crate::db::tasks::TaskInput;
use crate::monitor::ActivityMonitor;
use crate::score;
use anyhow::anyhow;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
    pub cache: Arc<Mutex<ClassificationCache>>,
    pub monitor: Arc<Mutex<ActivityMonitor>>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/status", get(status))
        .route("/api/v1/score/today", get(score_today))
        .route("/api/v1/score/:date", get(score_by_date))
        .route("/api/v1/scores", get(score_history))
        .route("/api/v1/queue", get(signal_queue))
        .route("/api/v1/queue/order", put(reorder_queue))
        .route("/api/v1/backlog", get(backlog))
        .route("/api/v1/tasks", post(task_create))
        .route(
            "/api/v1/tasks/:id",
            get(task_get).put(task_update).delete(task_delete),
        )
        .route("/api/v1/tasks/:id/start", post(task_start))
        .route("/api/v1/tasks/:id/complete", post(task_complete))
        .route("/api/v1/tasks/:id/defer", post(task_defer))
        .route("/api/v1/tasks/:id/work", post(task_work))
        .route("/api/v1/tasks/worked", get(tasks_worked))
        .route("/api/v1/activity/summary", get(activity_summary))
        .route("/api/v1/activity/apps", get(activity_apps))
        .route("/api/v1/activity/intervals", get(activity_intervals))
        .route("/api/v1/goals", get(goals_list).post(goal_create))
        .route("/api/v1/goals/:id", delete(goal_delete))
        .route("/api/v1/categories", get(categories_list).post(category_create))
        .route("/api/v1/categories/:id", delete(category_delete))
        .route("/api/v1/categories/:id/tasks", get(category_tasks))
        .route(
            "/api/v1/classifications",
            get(classifications_list).put(classification_upsert),
        )
        .route(
            "/api/v1/classifications/:id",
            delete(classification_delete),
        )
        .route("/api/v1/monitor/pause", post(monitor_pause))
        .route("/api/v1/monitor/resume", post(monitor_resume))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct DateQuery {
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ReorderPayload {
    task_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct GoalPayload {
    title: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CategoryPayload {
    name: String,
}

#[derive(Debug, Serialize)]
struct StatusPayload {
    daemon: String,
    daemon_loaded: bool,
    monitor: String,
    current_state: Option<crate::db::AttentionState>,
    last_tracked_at: Option<i64>,
    today_score: Option<i64>,
    streak_days: Option<i64>,
    api_port: u16,
}

async fn status(State(state): State<ApiState>) -> ApiResult<Json<StatusPayload>> {
    let database = Database::open(&state.config.db_path)?;
    let daemon_status = daemon::status(&state.config)?;
    let today = Local::now().date_naive();
    let stored = database.score_for_date(today)?;
    let (monitor_status, current_state) = {
        let monitor = lock_monitor(&state)?;
        (monitor.status(), monitor.current_state())
    };

    let payload = StatusPayload {
        daemon: daemon_status.details,
        daemon_loaded: daemon_status.loaded,
        monitor: monitor_status.as_str().to_string(),
        current_state,
        last_tracked_at: database.latest_interval_timestamp()?,
        today_score: stored.as_ref().map(|row| row.score),
        streak_days: stored.as_ref().map(|row| row.streak_days),
        api_port: state.config.api_port,
    };

    Ok(Json(payload))
}

async fn score_today(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let database = Database::open(&state.config.db_path)?;
    let breakdown = score::save_score(&database, Local::now().date_naive(), Utc::now().timestamp())?;

    Ok(Json(json!(breakdown)))
}

async fn score_by_date(
    State(state): State<ApiState>,
    Path(date): Path<String>,
) -> ApiResult<Json<Value>> {
    let target_date = parse_date(&date)?;
    let database = Database::open(&state.config.db_path)?;
    let breakdown = score::save_score(&database, target_date, Utc::now().timestamp())?;

    Ok(Json(json!(breakdown)))
}

async fn score_history(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    let limit = query.limit.unwrap_or(14).clamp(1, 90);
    let database = Database::open(&state.config.db_path)?;
    let scores = database.recent_scores(limit)?;

    Ok(Json(json!({ "scores": scores })))
}

async fn signal_queue(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    let limit = query.limit.unwrap_or(5);
    let database = Database::open(&state.config.db_path)?;
    let queue = database.signal_queue(Local::now().date_naive(), limit)?;

    Ok(Json(json!({ "queue": queue })))
}

async fn backlog(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let database = Database::open(&state.config.db_path)?;
    let today = Local::now().date_naive();
    let queued_ids = database
        .signal_queue(today, 5)?
        .into_iter()
        .map(|task| task.id)
        .collect::<Vec<_>>();
    let backlog = database.backlog(&queued_ids)?;

    Ok(Json(json!({ "backlog": backlog })))
}

async fn reorder_queue(
    State(state): State<ApiState>,
    Json(payload): Json<ReorderPayload>,
) -> ApiResult<Json<Value>> {
    if payload.task_ids.is_empty() {
        return Err(ApiError::BadRequest("task_ids must not be empty".to_string()));
    }

    let mut database = Database::open(&state.config.db_path)?;
    database.reorder_signal_queue(&payload.task_ids, Utc::now().timestamp())?;

    Ok(Json(json!({ "reordered": payload.task_ids.len() })))
}

async fn task_create(
    State(state): State<ApiState>,
    Json(input): Json<TaskInput>,
) -> ApiResult<Json<Value>> {
    if input.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }

    let database = Database::open(&state.config.db_path)?;
    let task = database.create_task(&input, Utc::now().timestamp())?;

    Ok(Json(json!(task)))
}

async fn task_get(State(state): State<ApiState>, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    let database = Database::open(&state.config.db_path)?;
    let task = database
        .task(id)?
        .ok_or_else(|| ApiError::NotFound(format!("No task with id {id}")))?;

    Ok(Json(json!(task)))
}

async fn task_update(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(input): Json<TaskInput>,
) -> ApiResult<Json<Value>> {
    let database = Database::open(&state.config.db_path)?;
    let task = database
        .update_task(id, &input, Utc::now().timestamp())?
        .ok_or_else(|| ApiError::NotFound(format!("No task with id {id}")))?;

    Ok(Json(json!(task)))
}

async fn task_delete(State(state): State<ApiState>, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    let database = Database::open(&state.config.db_path)?;
    if !database.delete_task(id)? {
        return Err(ApiError::NotFound(format!("No task with id {id}")));
    }

    Ok(Json(json!({ "deleted": id })))
}

async fn task_start(State(state): State<ApiState>, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    let mut database = Database::open(&state.config.db_path)?;
    let task = database
        .start_task(id, Utc::now().timestamp())?
        .ok_or_else(|| ApiError::NotFound(format!("Task {id} cannot be started")))?;

    Ok(Json(json!(task)))
}

async fn task_complete(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let database = Database::open(&state.config.db_path)?;
    let task = database
        .complete_task(id, Utc::now().timestamp())?
        .ok_or_else(|| ApiError::NotFound(format!("No task with id {id}")))?;

    Ok(Json(json!(task)))
}

async fn task_defer(State(state): State<ApiState>, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    let database = Database::open(&state.config.db_path)?;
    let task = database
        .defer_task(id, Local::now().date_naive(), Utc::now().timestamp())?
        .ok_or_else(|| ApiError::NotFound(format!("Task {id} cannot be deferred")))?;

    Ok(Json(json!(task)))
}

async fn task_work(State(state): State<ApiState>, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    let database = Database::open(&state.config.db_path)?;
    let task = database
        .record_work(id, Local::now().date_naive(), Utc::now().timestamp())?
        .ok_or_else(|| ApiError::NotFound(format!("No task with id {id}")))?;

    Ok(Json(json!(task)))
}

async fn tasks_worked(
    State(state): State<ApiState>,
    Query(query): Query<DateQuery>,
) -> ApiResult<Json<Value>> {
    let date = resolve_date(query.date.as_deref())?;
    let database = Database::open(&state.config.db_path)?;
    let tasks = database.tasks_worked_on(date)?;

    Ok(Json(json!({
        "date": date.format("%Y-%m-%d").to_string(),
        "tasks": tasks,
    })))
}

async fn category_tasks(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let database = Database::open(&state.config.db_path)?;
    let tasks = database.incomplete_by_category(id)?;

    Ok(Json(json!({ "tasks": tasks })))
}

async fn activity_intervals(
    State(state): State<ApiState>,
    Query(query): Query<DateQuery>,
) -> ApiResult<Json<Value>> {
    let date = resolve_date(query.date.as_deref())?;
    let database = Database::open(&state.config.db_path)?;
    let intervals = database.intervals_for_date(date)?;

    Ok(Json(json!({
        "date": date.format("%Y-%m-%d").to_string(),
        "count": intervals.len(),
        "intervals": intervals,
    })))
}

async fn activity_summary(
    State(state): State<ApiState>,
    Query(query): Query<DateQuery>,
) -> ApiResult<Json<Value>> {
    let date = resolve_date(query.date.as_deref())?;
    let database = Database::open(&state.config.db_path)?;
    let summary = database.interval_summary_for_date(date)?;

    Ok(Json(json!({
        "date": date.format("%Y-%m-%d").to_string(),
        "summary": summary,
    })))
}

async fn activity_apps(
    State(state): State<ApiState>,
    Query(query): Query<DateQuery>,
) -> ApiResult<Json<Value>> {
    let date = resolve_date(query.date.as_deref())?;
    let database = Database::open(&state.config.db_path)?;
    let apps = database.app_breakdown_for_date(date)?;

    Ok(Json(json!({
        "date": date.format("%Y-%m-%d").to_string(),
        "apps": apps,
    })))
}

async fn goals_list(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let database = Database::open(&state.config.db_path)?;
    Ok(Json(json!({ "goals": database.list_goals()? })))
}

async fn goal_create(
    State(state): State<ApiState>,
    Json(payload): Json<GoalPayload>,
) -> ApiResult<Json<Value>> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }

    let database = Database::open(&state.config.db_path)?;
    let goal = database.create_goal(
        payload.title.trim(),
        payload.description.as_deref(),
        Utc::now().timestamp(),
    )?;

    Ok(Json(json!(goal)))
}

async fn goal_delete(State(state): State<ApiState>, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    let database = Database::open(&state.config.db_path)?;
    if !database.delete_goal(id)? {
        return Err(ApiError::NotFound(format!("No goal with id {id}")));
    }

    Ok(Json(json!({ "deleted": id })))
}

async fn categories_list(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let database = Database::open(&state.config.db_path)?;
    Ok(Json(json!({ "categories": database.list_categories()? })))
}

async fn category_create(
    State(state): State<ApiState>,
    Json(payload): Json<CategoryPayload>,
) -> ApiResult<Json<Value>> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }

    let database = Database::open(&state.config.db_path)?;
    let category = database.create_category(payload.name.trim(), Utc::now().timestamp())?;

    Ok(Json(json!(category)))
}

async fn category_delete(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let database = Database::open(&state.config.db_path)?;
    if !database.delete_category(id)? {
        return Err(ApiError::NotFound(format!("No category with id {id}")));
    }

    Ok(Json(json!({ "deleted": id })))
}

async fn classifications_list(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let database = Database::open(&state.config.db_path)?;
    Ok(Json(json!({
        "classifications": database.list_classifications()?
    })))
}

async fn classification_upsert(
    State(state): State<ApiState>,
    Json(input): Json<ClassificationInput>,
) -> ApiResult<Json<Value>> {
    if input.app_name.trim().is_empty() {
        return Err(ApiError::BadRequest("app_name must not be empty".to_string()));
    }

    let database = Database::open(&state.config.db_path)?;
    let row = database.upsert_classification(&input, true)?;
    lock_cache(&state)?.invalidate();

    Ok(Json(json!(row)))
}

async fn classification_delete(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let database = Database::open(&state.config.db_path)?;
    if !database.delete_classification(id)? {
        return Err(ApiError::NotFound(format!(
            "No custom classification with id {id}"
        )));
    }
    lock_cache(&state)?.invalidate();

    Ok(Json(json!({ "deleted": id })))
}

async fn monitor_pause(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    lock_monitor(&state)?.pause(Utc::now().timestamp())?;
    Ok(Json(json!({ "paused": true })))
}

async fn monitor_resume(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    lock_monitor(&state)?.resume(Utc::now().timestamp())?;
    Ok(Json(json!({ "resumed": true })))
}

fn lock_cache(state: &ApiState) -> Result<MutexGuard<'_, ClassificationCache>, ApiError> {
    state
        .cache
        .lock()
        .map_err(|_| ApiError::Internal(anyhow!("classification cache mutex poisoned")))
}

fn lock_monitor(state: &ApiState) -> Result<MutexGuard<'_, ActivityMonitor>, ApiError> {
    state
        .monitor
        .lock()
        .map_err(|_| ApiError::Internal(anyhow!("activity monitor mutex poisoned")))
}

fn resolve_date(input: Option<&str>) -> Result<NaiveDate, ApiError> {
    match input {
        Some(raw) => parse_date(raw),
        None => Ok(Local::now().date_naive()),
    }
}

fn parse_date(input: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|_| {
        ApiError::BadRequest(format!("Invalid date format: {input}. Example: 2026-02-18"))
    })
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Internal(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": error.to_string() })),
            )
                .into_response(),
        }
    }
}
