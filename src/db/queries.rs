pub const CREATE_GOALS: &str = r#"
CREATE TABLE IF NOT EXISTS goals (
  id          INTEGER PRIMARY KEY AUTOINCREMENT,
  title       TEXT NOT NULL,
  description TEXT,
  created_at  INTEGER NOT NULL
);
"#;

pub const CREATE_CATEGORIES: &str = r#"
CREATE TABLE IF NOT EXISTS categories (
  id         INTEGER PRIMARY KEY AUTOINCREMENT,
  name       TEXT NOT NULL UNIQUE,
  created_at INTEGER NOT NULL
);
"#;

pub const CREATE_TASKS: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
  id               INTEGER PRIMARY KEY AUTOINCREMENT,
  title            TEXT NOT NULL,
  description      TEXT,
  goal_id          INTEGER REFERENCES goals(id) ON DELETE SET NULL,
  category_id      INTEGER REFERENCES categories(id) ON DELETE SET NULL,
  status           TEXT NOT NULL DEFAULT 'pending',
  priority         INTEGER NOT NULL DEFAULT 3,
  rationale        TEXT,
  scheduled_date   TEXT NOT NULL,
  start_date       TEXT NOT NULL,
  end_date         TEXT,
  estimated_days   INTEGER NOT NULL DEFAULT 1,
  days_worked      INTEGER NOT NULL DEFAULT 0,
  last_worked_date TEXT,
  completed_at     INTEGER,
  created_at       INTEGER NOT NULL,
  updated_at       INTEGER NOT NULL
);
"#;

pub const CREATE_ACTIVITY_INTERVALS: &str = r#"
CREATE TABLE IF NOT EXISTS activity_intervals (
  id           INTEGER PRIMARY KEY AUTOINCREMENT,
  started_at   INTEGER NOT NULL,
  app_name     TEXT NOT NULL,
  window_title TEXT,
  bundle_id    TEXT,
  url          TEXT,
  state        TEXT NOT NULL DEFAULT 'amber',
  duration_sec INTEGER NOT NULL DEFAULT 0,
  task_id      INTEGER REFERENCES tasks(id) ON DELETE SET NULL
);
"#;

pub const CREATE_APP_CLASSIFICATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS app_classifications (
  id            INTEGER PRIMARY KEY AUTOINCREMENT,
  app_name      TEXT NOT NULL,
  bundle_id     TEXT NOT NULL DEFAULT '',
  default_state TEXT NOT NULL DEFAULT 'amber',
  keyword_rules TEXT NOT NULL DEFAULT '[]',
  is_custom     INTEGER NOT NULL DEFAULT 1,
  UNIQUE(app_name, bundle_id)
);
"#;

pub const CREATE_DAILY_SCORES: &str = r#"
CREATE TABLE IF NOT EXISTS daily_scores (
  id               INTEGER PRIMARY KEY AUTOINCREMENT,
  date             TEXT NOT NULL UNIQUE,
  signal_minutes   INTEGER NOT NULL DEFAULT 0,
  adjacent_minutes INTEGER NOT NULL DEFAULT 0,
  noise_minutes    INTEGER NOT NULL DEFAULT 0,
  total_minutes    INTEGER NOT NULL DEFAULT 0,
  tasks_completed  INTEGER NOT NULL DEFAULT 0,
  tasks_total      INTEGER NOT NULL DEFAULT 0,
  score            INTEGER NOT NULL DEFAULT 0,
  streak_days      INTEGER NOT NULL DEFAULT 0,
  updated_at       INTEGER NOT NULL
);
"#;

pub const INDEX_TASKS_STATUS: &str =
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);";

pub const INDEX_TASKS_SCHEDULED_DATE: &str =
    "CREATE INDEX IF NOT EXISTS idx_tasks_scheduled_date ON tasks(scheduled_date);";

pub const INDEX_INTERVALS_STARTED_AT: &str =
    "CREATE INDEX IF NOT EXISTS idx_activity_intervals_started_at ON activity_intervals(started_at);";

pub const INDEX_CLASSIFICATIONS_APP_NAME: &str =
    "CREATE INDEX IF NOT EXISTS idx_app_classifications_app_name ON app_classifications(app_name);";

pub const INDEX_DAILY_SCORES_DATE: &str =
    "CREATE INDEX IF NOT EXISTS idx_daily_scores_date ON daily_scores(date);";

pub fn schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_GOALS,
        CREATE_CATEGORIES,
        CREATE_TASKS,
        CREATE_ACTIVITY_INTERVALS,
        CREATE_APP_CLASSIFICATIONS,
        CREATE_DAILY_SCORES,
        INDEX_TASKS_STATUS,
        INDEX_TASKS_SCHEDULED_DATE,
        INDEX_INTERVALS_STARTED_AT,
        INDEX_CLASSIFICATIONS_APP_NAME,
        INDEX_DAILY_SCORES_DATE,
    ]
}
