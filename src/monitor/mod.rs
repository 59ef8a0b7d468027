pub mod window;

use crate::classifier;
use crate::classifier::cache::ClassificationCache;
use crate::config::Config;
use crate::db::intervals::IntervalInput;
use crate::db::{AttentionState, Database};
use anyhow::{Result, anyhow};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{error, info};
use window::WindowSampler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    Stopped,
    Running,
    Paused,
}

impl MonitorStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Paused => "paused",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateChange {
    pub state: AttentionState,
    pub app_name: String,
    pub window_title: Option<String>,
    pub state_changed: bool,
}

type ChangeObserver = Box<dyn FnMut(&StateChange) + Send>;

#[derive(Debug)]
struct OpenInterval {
    id: i64,
    started_at: i64,
    state: AttentionState,
    app_name: String,
    window_title: Option<String>,
}

pub struct ActivityMonitor {
    config: Arc<Config>,
    cache: Arc<Mutex<ClassificationCache>>,
    sampler: Box<dyn WindowSampler>,
    status: MonitorStatus,
    current: Option<OpenInterval>,
    observers: Vec<ChangeObserver>,
}

impl ActivityMonitor {
    pub fn new(
        config: Arc<Config>,
        cache: Arc<Mutex<ClassificationCache>>,
        sampler: Box<dyn WindowSampler>,
    ) -> Self {
        Self {
            config,
            cache,
            sampler,
            status: MonitorStatus::Stopped,
            current: None,
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&StateChange) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn status(&self) -> MonitorStatus {
        self.status
    }

    pub fn start(&mut self, now: i64) -> Result<()> {
        if self.status != MonitorStatus::Stopped {
            return Ok(());
        }

        self.status = MonitorStatus::Running;
        self.poll_at(now)
    }

    pub fn poll_at(&mut self, now: i64) -> Result<()> {
        if self.status != MonitorStatus::Running {
            return Ok(());
        }

        // No resolvable foreground window (locked screen, missing permission):
        // skip the tick without touching the open interval.
        let Some(sample) = self.sampler.sample() else {
            return Ok(());
        };

        let database = Database::open(&self.config.db_path)?;

        let state = {
            let mut cache = self
                .cache
                .lock()
                .map_err(|_| anyhow!("classification cache mutex poisoned"))?;
            cache.refresh(&database)?;

            classifier::classify(
                &sample.app_name,
                sample.window_title.as_deref().unwrap_or(""),
                sample.url.as_deref(),
                &cache,
                database.active_task()?.as_ref(),
            )
        };

        let unchanged = self.current.as_ref().is_some_and(|current| {
            current.state == state
                && current.app_name == sample.app_name
                && current.window_title == sample.window_title
        });
        if unchanged {
            return Ok(());
        }

        let previous_state = self.current.as_ref().map(|current| current.state);
        self.finalize_current(&database, now)?;

        let task_id = database.active_task()?.map(|task| task.id);
        let id = database.append_interval(&IntervalInput {
            started_at: now,
            app_name: sample.app_name.clone(),
            window_title: sample.window_title.clone(),
            bundle_id: sample.bundle_id.clone(),
            url: sample.url.clone(),
            state,
            task_id,
        })?;
        database.cleanup_old_intervals(self.config.retention_days)?;

        self.current = Some(OpenInterval {
            id,
            started_at: now,
            state,
            app_name: sample.app_name.clone(),
            window_title: sample.window_title.clone(),
        });

        let change = StateChange {
            state,
            app_name: sample.app_name,
            window_title: sample.window_title,
            state_changed: previous_state != Some(state),
        };
        for observer in &mut self.observers {
            observer(&change);
        }

        Ok(())
    }

    pub fn pause(&mut self, now: i64) -> Result<()> {
        if self.status != MonitorStatus::Running {
            return Ok(());
        }

        let database = Database::open(&self.config.db_path)?;
        self.finalize_current(&database, now)?;
        self.status = MonitorStatus::Paused;
        info!("activity monitor paused");

        Ok(())
    }

    pub fn resume(&mut self, now: i64) -> Result<()> {
        if self.status != MonitorStatus::Paused {
            return Ok(());
        }

        self.status = MonitorStatus::Running;
        info!("activity monitor resumed");
        self.poll_at(now)
    }

    pub fn stop(&mut self, now: i64) -> Result<()> {
        if self.status == MonitorStatus::Stopped {
            return Ok(());
        }

        let database = Database::open(&self.config.db_path)?;
        self.finalize_current(&database, now)?;
        self.status = MonitorStatus::Stopped;
        info!("activity monitor stopped");

        Ok(())
    }

    pub fn current_state(&self) -> Option<AttentionState> {
        self.current.as_ref().map(|current| current.state)
    }

    fn finalize_current(&mut self, database: &Database, now: i64) -> Result<()> {
        if let Some(current) = self.current.take() {
            database.update_interval_duration(current.id, now - current.started_at)?;
        }

        Ok(())
    }
}

pub async fn run_activity_monitor(monitor: Arc<Mutex<ActivityMonitor>>, config: Arc<Config>) -> Result<()> {
    let mut ticker = interval(Duration::from_secs(config.polling_seconds));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        polling_seconds = config.polling_seconds,
        "activity monitor started"
    );

    {
        let mut monitor = monitor
            .lock()
            .map_err(|_| anyhow!("activity monitor mutex poisoned"))?;
        monitor.start(Utc::now().timestamp())?;
    }

    loop {
        ticker.tick().await;

        let result = monitor
            .lock()
            .map_err(|_| anyhow!("activity monitor mutex poisoned"))
            .and_then(|mut monitor| monitor.poll_at(Utc::now().timestamp()));

        if let Err(error) = result {
            error!(error = %error, "activity poll failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::window::{WindowSample, WindowSampler};
    use super::{ActivityMonitor, MonitorStatus, StateChange};
    use crate::classifier::cache::ClassificationCache;
    use crate::config::Config;
    use crate::db::{AttentionState, Database, day_bounds};
    use chrono::Local;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct FakeSampler {
        samples: VecDeque<Option<WindowSample>>,
    }

    impl WindowSampler for FakeSampler {
        fn sample(&mut self) -> Option<WindowSample> {
            self.samples.pop_front().flatten()
        }
    }

    fn sample(app: &str, title: &str) -> Option<WindowSample> {
        Some(WindowSample {
            app_name: app.to_string(),
            window_title: Some(title.to_string()),
            bundle_id: None,
            url: None,
        })
    }

    fn monitor_with(
        samples: Vec<Option<WindowSample>>,
    ) -> (ActivityMonitor, Arc<Mutex<Vec<StateChange>>>, tempfile::TempDir, Arc<Config>) {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = Arc::new(Config {
            db_path: dir.path().join("signaltrack.db"),
            ..Config::default()
        });
        Database::open(&config.db_path).expect("open db");

        let cache = Arc::new(Mutex::new(ClassificationCache::new(Duration::from_secs(
            3600,
        ))));
        let mut monitor = ActivityMonitor::new(
            Arc::clone(&config),
            cache,
            Box::new(FakeSampler {
                samples: samples.into(),
            }),
        );

        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        monitor.subscribe(move |change| {
            sink.lock().expect("changes lock").push(change.clone());
        });

        (monitor, changes, dir, config)
    }

    #[test]
    fn change_finalizes_previous_interval_and_opens_new() {
        let today = Local::now().date_naive();
        let (t0, _) = day_bounds(today).expect("bounds");
        let (mut monitor, changes, _dir, config) = monitor_with(vec![
            sample("Zed", "main.rs"),
            sample("Zed", "main.rs"),
            sample("Safari", "lofi beats - YouTube"),
        ]);

        monitor.start(t0).expect("start");
        monitor.poll_at(t0 + 5).expect("poll");
        monitor.poll_at(t0 + 300).expect("poll");

        let database = Database::open(&config.db_path).expect("open db");
        let intervals = database.intervals_for_date(today).expect("intervals");
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].app_name, "Zed");
        assert_eq!(intervals[0].state, AttentionState::Green);
        assert_eq!(intervals[0].duration_sec, 300);
        assert_eq!(intervals[1].app_name, "Safari");
        assert_eq!(intervals[1].state, AttentionState::Red);
        assert_eq!(intervals[1].duration_sec, 0);

        let changes = changes.lock().expect("changes lock");
        assert_eq!(changes.len(), 2);
        assert!(changes[0].state_changed);
        assert!(changes[1].state_changed);
    }

    #[test]
    fn title_change_within_state_notifies_without_state_flag() {
        let today = Local::now().date_naive();
        let (t0, _) = day_bounds(today).expect("bounds");
        let (mut monitor, changes, _dir, _config) = monitor_with(vec![
            sample("Zed", "main.rs"),
            sample("Zed", "lib.rs"),
        ]);

        monitor.start(t0).expect("start");
        monitor.poll_at(t0 + 60).expect("poll");

        let changes = changes.lock().expect("changes lock");
        assert_eq!(changes.len(), 2);
        assert!(!changes[1].state_changed);
    }

    #[test]
    fn failed_sample_skips_tick_and_keeps_interval_open() {
        let today = Local::now().date_naive();
        let (t0, _) = day_bounds(today).expect("bounds");
        let (mut monitor, _changes, _dir, config) = monitor_with(vec![
            sample("Zed", "main.rs"),
            None,
            sample("Zed", "main.rs"),
        ]);

        monitor.start(t0).expect("start");
        monitor.poll_at(t0 + 5).expect("poll");
        monitor.poll_at(t0 + 10).expect("poll");

        let database = Database::open(&config.db_path).expect("open db");
        let intervals = database.intervals_for_date(today).expect("intervals");
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].duration_sec, 0);
    }

    #[test]
    fn pause_finalizes_and_resume_polls_immediately() {
        let today = Local::now().date_naive();
        let (t0, _) = day_bounds(today).expect("bounds");
        let (mut monitor, _changes, _dir, config) = monitor_with(vec![
            sample("Zed", "main.rs"),
            sample("Slack", "#incident-4123"),
            sample("Slack", "#incident-4123"),
        ]);

        monitor.start(t0).expect("start");
        monitor.pause(t0 + 120).expect("pause");
        assert_eq!(monitor.status(), MonitorStatus::Paused);

        // polls while paused must not log anything
        monitor.poll_at(t0 + 130).expect("poll");

        monitor.resume(t0 + 200).expect("resume");
        monitor.stop(t0 + 260).expect("stop");
        assert_eq!(monitor.status(), MonitorStatus::Stopped);

        let database = Database::open(&config.db_path).expect("open db");
        let intervals = database.intervals_for_date(today).expect("intervals");
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].duration_sec, 120);
        assert_eq!(intervals[1].started_at, t0 + 200);
        assert_eq!(intervals[1].duration_sec, 60);
    }

    #[test]
    fn start_twice_is_a_noop() {
        let today = Local::now().date_naive();
        let (t0, _) = day_bounds(today).expect("bounds");
        let (mut monitor, _changes, _dir, config) = monitor_with(vec![
            sample("Zed", "main.rs"),
            sample("Zed", "main.rs"),
        ]);

        monitor.start(t0).expect("start");
        monitor.start(t0 + 5).expect("start again");

        let database = Database::open(&config.db_path).expect("open db");
        assert_eq!(database.intervals_for_date(today).expect("intervals").len(), 1);
    }
}
