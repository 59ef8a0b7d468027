use crate::config::{Config, parse_hhmm};
use crate::daemon;
use crate::db::Database;
use crate::monitor::window;
use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, theme::ColorfulTheme};
use std::process::Command;

pub fn run_onboarding(install_daemon_flag: bool) -> Result<Config> {
    println!("──────────────────────────────────────────");
    println!("  Welcome to SignalTrack onboarding.");
    println!("──────────────────────────────────────────");

    let theme = ColorfulTheme::default();

    println!("\n[1/5] macOS Accessibility permission");
    println!("  Window titles cannot be read without Accessibility access.");

    let should_open = Confirm::with_theme(&theme)
        .with_prompt("  Open System Settings now?")
        .default(true)
        .interact()
        .context("Failed to read permission prompt input")?;

    if should_open {
        open_accessibility_settings();
        println!("  -> Opened System Settings > Privacy & Security > Accessibility");
    }

    if window::window_access_available() {
        println!("  ✓ Window title access verified");
    } else {
        println!("  ! Continuing without window titles (app names only)");
    }

    println!("\n[2/5] Daily score rollup time");
    let rollup_time: String = Input::with_theme(&theme)
        .with_prompt("  When should the daily score be finalized?")
        .default("23:55".to_string())
        .validate_with(|input: &String| -> std::result::Result<(), &str> {
            parse_hhmm(input)
                .map(|_| ())
                .map_err(|_| "Use HH:MM format (example: 23:55)")
        })
        .interact_text()
        .context("Failed to read rollup time")?;
    println!("  ✓ Score will be finalized daily at {rollup_time}");

    println!("\n[3/5] Drift nudges");
    let nudge_enabled = Confirm::with_theme(&theme)
        .with_prompt("  Nudge you after sustained distraction?")
        .default(true)
        .interact()
        .context("Failed to read nudge preference")?;

    let nudge_threshold_minutes = if nudge_enabled {
        let minutes: String = Input::with_theme(&theme)
            .with_prompt("  Minutes of drift before the first nudge")
            .default("10".to_string())
            .validate_with(|input: &String| -> std::result::Result<(), &str> {
                input
                    .parse::<u64>()
                    .ok()
                    .filter(|value| *value >= 1)
                    .map(|_| ())
                    .ok_or("Enter a number of minutes (at least 1)")
            })
            .interact_text()
            .context("Failed to read nudge threshold")?;
        minutes.parse::<u64>().unwrap_or(10)
    } else {
        10
    };

    println!("\n[4/5] AI assistance (optional)");
    let ai_key: String = Input::with_theme(&theme)
        .with_prompt("  API key for AI nudges/briefings (empty to skip)")
        .allow_empty(true)
        .default(String::new())
        .interact_text()
        .context("Failed to read AI key")?;
    let ai_enabled = !ai_key.trim().is_empty();
    if ai_enabled {
        println!("  ✓ AI features enabled");
    } else {
        println!("  ✓ Skipped, fallback messages will be used");
    }

    println!("\n[5/5] Install background agent");
    println!("  Register a launchd agent so tracking starts automatically after reboot.");

    let install_daemon = if install_daemon_flag {
        true
    } else {
        Confirm::with_theme(&theme)
            .with_prompt("  Install agent now?")
            .default(true)
            .interact()
            .context("Failed to read agent install input")?
    };

    let config = Config {
        rollup_time,
        nudge_enabled,
        nudge_threshold_minutes,
        ai_enabled,
        ai_api_key: ai_enabled.then_some(ai_key.trim().to_string()),
        ..Config::default()
    };

    config.ensure_bootstrap_files()?;
    config.save()?;
    let _ = Database::open(&config.db_path)?;

    if install_daemon {
        let plist_path = daemon::install(&config)?;
        daemon::load(&config)?;
        println!("  ✓ Agent installed ({})", plist_path.display());
    } else {
        println!("  ✓ Skipped agent installation");
    }

    println!("\n──────────────────────────────────────────");
    println!("  Onboarding complete!");
    println!("  Run `signaltrack status` to check current state.");
    println!("──────────────────────────────────────────");

    Ok(config)
}

#[cfg(target_os = "macos")]
fn open_accessibility_settings() {
    let _ = Command::new("open")
        .arg("x-apple.systempreferences:com.apple.preference.security?Privacy_Accessibility")
        .status();
}

#[cfg(not(target_os = "macos"))]
fn open_accessibility_settings() {}
