mod ai;
mod api;
mod classifier;
mod cli;
mod config;
mod daemon;
mod db;
mod monitor;
mod nudge;
mod scheduler;
mod score;

use crate::classifier::cache::ClassificationCache;
use crate::cli::onboard::run_onboarding;
use crate::cli::{AiCommands, Cli, Commands, ConfigCommands};
use crate::config::{Config, FIXED_POLLING_SECONDS};
use crate::db::Database;
use crate::monitor::ActivityMonitor;
use crate::monitor::window::SystemSampler;
use crate::nudge::NudgeManager;
use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Local, NaiveDate, Utc};
use clap::Parser;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use tokio::signal;
use tokio::time::{Duration, interval};
use tracing::info;
use tracing_subscriber::EnvFilter;

const NUDGE_TICK_SECONDS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Onboard { install_daemon } => {
            let _ = run_onboarding(install_daemon)?;
            Ok(())
        }
        Commands::Config { command } => handle_config_command(command),
        Commands::Status => handle_status(),
        Commands::Doctor => handle_doctor(),
        Commands::Start => handle_start().await,
        Commands::Stop => handle_stop(),
        Commands::Restart => handle_restart(),
        Commands::Score { date } => handle_score(date),
        Commands::Queue { limit } => handle_queue(limit),
        Commands::Briefing => handle_briefing(),
        Commands::Ai { command } => handle_ai_command(command),
        Commands::Service => {
            let config = load_config()?;
            run_service(config).await
        }
        Commands::Uninstall => handle_uninstall(),
    }
}

fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            let mut config = load_or_default_config()?;
            config.set_value(&key, &value)?;
            config.ensure_bootstrap_files()?;
            config.save()?;

            let masked = if key.contains("api_key") {
                "***hidden***".to_string()
            } else {
                value
            };
            println!("Config saved: {key} = {masked}");
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let config = load_config()?;
            let value = config
                .get_value(&key)
                .with_context(|| format!("Unsupported config key: {key}"))?;

            println!("{value}");
            Ok(())
        }
    }
}

fn handle_status() -> Result<()> {
    let config = load_config()?;
    let database = Database::open(&config.db_path)?;
    let daemon_status = daemon::status(&config)?;
    let today = Local::now().date_naive();
    let stored = database.score_for_date(today)?;

    println!("SignalTrack status");
    println!("- daemon_label: {}", config.daemon_label);
    println!("- daemon_installed: {}", daemon_status.installed);
    println!("- daemon_loaded: {}", daemon_status.loaded);
    println!(
        "- last_tracked_at: {}",
        database
            .latest_interval_timestamp()?
            .map(|timestamp| timestamp.to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    println!(
        "- today_score: {}",
        stored
            .as_ref()
            .map(|row| row.score.to_string())
            .unwrap_or_else(|| "not computed".to_string())
    );
    println!(
        "- streak_days: {}",
        stored
            .as_ref()
            .map(|row| row.streak_days.to_string())
            .unwrap_or_else(|| "0".to_string())
    );

    Ok(())
}

fn handle_doctor() -> Result<()> {
    let config_path = Config::config_path()?;
    let mut issues = Vec::new();

    if config_path.exists() {
        println!("[OK] config.json found: {}", config_path.display());
    } else {
        println!("[WARN] config.json not found: {}", config_path.display());
        issues.push("config missing".to_string());
    }

    let config = load_or_default_config()?;

    match Database::open(&config.db_path) {
        Ok(database) => {
            println!("[OK] SQLite reachable: {}", config.db_path.display());
            match database.list_classifications() {
                Ok(rows) if !rows.is_empty() => {
                    println!("[OK] app classifications present: {}", rows.len());
                }
                Ok(_) => {
                    println!("[WARN] no app classifications found");
                    issues.push("classifications missing".to_string());
                }
                Err(error) => {
                    println!("[WARN] classification check failed: {error}");
                    issues.push("classifications unreadable".to_string());
                }
            }
        }
        Err(error) => {
            println!("[WARN] SQLite check failed: {error}");
            issues.push("db unreachable".to_string());
        }
    }

    if let Err(error) = config.parse_rollup_time() {
        println!("[WARN] invalid rollup_time setting: {error}");
        issues.push("invalid rollup_time".to_string());
    } else {
        println!("[OK] rollup_time format valid: {}", config.rollup_time);
    }

    if config.ai_enabled {
        if ai::has_api_key(&config) {
            println!("[OK] AI API key is configured");
        } else {
            println!("[WARN] AI is enabled but API key is missing");
            issues.push("ai api key missing".to_string());
        }
    } else {
        println!("[OK] AI feature disabled");
    }

    if monitor::window::window_access_available() {
        println!("[OK] window title collection available (Accessibility likely granted)");
    } else {
        println!("[WARN] window title collection unavailable (Accessibility may be missing)");
        issues.push("accessibility missing".to_string());
    }

    if issues.is_empty() {
        println!("doctor result: no issues");
    } else {
        println!("doctor result: {} warning(s)", issues.len());
    }

    Ok(())
}

async fn handle_start() -> Result<()> {
    let config = load_config()?;
    let daemon_status = daemon::status(&config)?;

    if daemon_status.installed {
        daemon::load(&config)?;
        println!("launchd agent started");
        Ok(())
    } else {
        println!("launchd agent is not installed. Running foreground service (Ctrl+C to stop).");
        run_service(config).await
    }
}

fn handle_stop() -> Result<()> {
    let config = load_config()?;
    daemon::unload(&config)?;
    println!("launchd agent stopped");
    Ok(())
}

fn handle_restart() -> Result<()> {
    let config = load_config()?;
    daemon::restart(&config)?;
    println!("launchd agent restarted");
    Ok(())
}

fn handle_score(date: Option<String>) -> Result<()> {
    let config = load_config()?;
    let target_date = parse_optional_date(date)?;
    let database = Database::open(&config.db_path)?;

    let breakdown = score::save_score(&database, target_date, Utc::now().timestamp())?;

    println!("Daily score for {}", breakdown.date);
    println!(
        "- tracked: {} min (signal {}, adjacent {}, noise {})",
        breakdown.summary.total_minutes,
        breakdown.summary.signal_minutes,
        breakdown.summary.adjacent_minutes,
        breakdown.summary.noise_minutes
    );
    println!(
        "- tasks: {}/{} completed",
        breakdown.tasks_completed, breakdown.tasks_total
    );
    println!(
        "- streak: {} day(s), bonus {}",
        breakdown.streak_days, breakdown.streak_bonus
    );
    println!("- score: {}", breakdown.final_score);

    Ok(())
}

fn handle_queue(limit: usize) -> Result<()> {
    let config = load_config()?;
    let database = Database::open(&config.db_path)?;
    let today = Local::now().date_naive();

    let queue = database.signal_queue(today, limit)?;
    let queued_ids = queue.iter().map(|task| task.id).collect::<Vec<_>>();
    let backlog = database.backlog(&queued_ids)?;

    if queue.is_empty() {
        println!("Signal queue is empty.");
    } else {
        println!("Signal queue:");
        for (index, task) in queue.iter().enumerate() {
            println!(
                "{}. [P{}][{}] {}",
                index + 1,
                task.priority,
                task.status.as_str(),
                task.title
            );
        }
    }
    println!("Backlog: {} task(s)", backlog.len());

    Ok(())
}

fn handle_briefing() -> Result<()> {
    let config = load_config()?;
    let database = Database::open(&config.db_path)?;
    let today = Local::now().date_naive();

    let queue = database.signal_queue(today, 5)?;
    let yesterday = database.score_for_date(today - ChronoDuration::days(1))?;

    let briefing = ai::morning_briefing(&config, today, &queue, yesterday.as_ref())?;
    println!("{briefing}");

    Ok(())
}

fn handle_ai_command(command: AiCommands) -> Result<()> {
    match command {
        AiCommands::Test {
            key,
            base_url,
            model,
        } => {
            let mut config = load_or_default_config()?;

            if let Some(value) = key {
                config.ai_api_key = Some(value);
            }
            if let Some(value) = base_url {
                config.ai_api_base_url = value;
            }
            if let Some(value) = model {
                config.ai_model = value;
            }

            let response = ai::test_connection(&config)?;
            println!("AI API connection successful");
            println!("{response}");

            Ok(())
        }
    }
}

fn handle_uninstall() -> Result<()> {
    let config = load_or_default_config()?;

    let _ = daemon::unload(&config);

    if let Ok(plist_path) = daemon::plist_path(&config) {
        if plist_path.exists() {
            let _ = fs::remove_file(&plist_path);
            println!("Removed agent plist: {}", plist_path.display());
        }
    }

    println!("Remove binary: cargo uninstall signaltrack");
    println!("Remove data (optional): rm -rf ~/.signaltrack");

    Ok(())
}

async fn run_service(config: Config) -> Result<()> {
    config.ensure_bootstrap_files()?;
    let _ = Database::open(&config.db_path)?;

    let shared_config = Arc::new(config);
    let cache = Arc::new(Mutex::new(ClassificationCache::new(StdDuration::from_secs(
        shared_config.cache_ttl_seconds,
    ))));
    let nudges = Arc::new(Mutex::new(NudgeManager::new(Arc::clone(&shared_config))));

    let mut monitor = ActivityMonitor::new(
        Arc::clone(&shared_config),
        Arc::clone(&cache),
        Box::new(SystemSampler),
    );
    let nudge_sink = Arc::clone(&nudges);
    monitor.subscribe(move |change| {
        let now = Utc::now().timestamp();
        if let Ok(mut nudges) = nudge_sink.lock() {
            if let Some(nudge) = nudges.observe(change.state, &change.app_name, now) {
                info!(
                    message = %nudge.message,
                    app = %nudge.app_name,
                    drift_minutes = nudge.drift_minutes,
                    "nudge"
                );
            }
        }
    });
    let monitor = Arc::new(Mutex::new(monitor));

    let api_state = api::routes::ApiState {
        config: Arc::clone(&shared_config),
        cache: Arc::clone(&cache),
        monitor: Arc::clone(&monitor),
    };

    let schedule_fallback = Arc::clone(&shared_config);
    let rollup_config = Arc::clone(&shared_config);
    let rollup_nudges = Arc::clone(&nudges);

    info!("SignalTrack service started");

    tokio::select! {
        monitor_result = monitor::run_activity_monitor(Arc::clone(&monitor), Arc::clone(&shared_config)) => {
            monitor_result?;
        }
        nudge_result = run_nudge_ticker(Arc::clone(&nudges)) => {
            nudge_result?;
        }
        rollup_result = scheduler::run_daily_rollup(move || {
            let rollup_time = Config::load()
                .map(|runtime| runtime.rollup_time)
                .unwrap_or_else(|_| schedule_fallback.rollup_time.clone());

            config::parse_hhmm(&rollup_time)
        }, move |date| {
            let config = Arc::clone(&rollup_config);
            let nudges = Arc::clone(&rollup_nudges);
            async move {
                run_daily_rollup_task(&config, &nudges, date)
            }
        }) => {
            rollup_result?;
        }
        api_result = api::run_server(api_state) => {
            api_result?;
        }
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
            if let Ok(mut monitor) = monitor.lock() {
                let _ = monitor.stop(Utc::now().timestamp());
            }
        }
    }

    Ok(())
}

fn run_daily_rollup_task(
    config: &Config,
    nudges: &Arc<Mutex<NudgeManager>>,
    date: NaiveDate,
) -> Result<()> {
    let database = Database::open(&config.db_path)?;
    let breakdown = score::save_score(&database, date, Utc::now().timestamp())?;

    if let Ok(mut nudges) = nudges.lock() {
        info!(
            drift_seconds = nudges.drift_seconds_today(),
            "drift total rolled over"
        );
        nudges.reset_day();
    }

    info!(
        date = %date,
        score = breakdown.final_score,
        streak = breakdown.streak_days,
        "daily score rolled up"
    );

    Ok(())
}

async fn run_nudge_ticker(nudges: Arc<Mutex<NudgeManager>>) -> Result<()> {
    let mut ticker = interval(Duration::from_secs(NUDGE_TICK_SECONDS));

    loop {
        ticker.tick().await;

        let fired = nudges
            .lock()
            .ok()
            .and_then(|mut nudges| nudges.tick(Utc::now().timestamp()));

        if let Some(nudge) = fired {
            info!(
                message = %nudge.message,
                app = %nudge.app_name,
                drift_minutes = nudge.drift_minutes,
                "nudge"
            );
        }
    }
}

fn parse_optional_date(input: Option<String>) -> Result<NaiveDate> {
    match input.as_deref() {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .with_context(|| format!("Invalid date format: {raw}. Example: 2026-02-18")),
        None => Ok(Local::now().date_naive()),
    }
}

fn load_or_default_config() -> Result<Config> {
    match Config::load() {
        Ok(config) => Ok(config),
        Err(_) => {
            let config = Config::default();
            config.ensure_bootstrap_files()?;
            config.save()?;
            Ok(config)
        }
    }
}

fn load_config() -> Result<Config> {
    let mut config = Config::load()
        .with_context(|| "Config file not found. Run `signaltrack onboard` first.".to_string())?;

    if config.polling_seconds != FIXED_POLLING_SECONDS {
        config.polling_seconds = FIXED_POLLING_SECONDS;
    }

    Ok(config)
}
