use crate::ai;
use crate::config::Config;
use crate::db::AttentionState;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

const FALLBACK_NUDGES: &[&str] = &[
    "Quick check-in: is this where today's focus should be?",
    "Your signal queue is waiting. One small step counts.",
    "Drifting happens. Pull back to the task you started.",
    "Five focused minutes beat thirty scattered ones.",
    "Close this tab, take a breath, and pick up where you left off.",
];

#[derive(Debug, Clone, Serialize)]
pub struct Nudge {
    pub message: String,
    pub app_name: String,
    pub drift_minutes: i64,
    pub fired_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Idle,
    Drifting {
        since: i64,
        app_name: String,
        last_nudge_at: Option<i64>,
        nudges_sent: u32,
    },
}

pub struct NudgeManager {
    config: Arc<Config>,
    phase: Phase,
    drift_seconds_today: i64,
}

impl NudgeManager {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            drift_seconds_today: 0,
        }
    }

    pub fn observe(&mut self, state: AttentionState, app_name: &str, now: i64) -> Option<Nudge> {
        let drifting = matches!(self.phase, Phase::Drifting { .. });

        match (drifting, state == AttentionState::Red) {
            (false, true) => {
                self.phase = Phase::Drifting {
                    since: now,
                    app_name: app_name.to_string(),
                    last_nudge_at: None,
                    nudges_sent: 0,
                };
                None
            }
            (true, true) => {
                // Hopping between distracting apps keeps the same drift session.
                if let Phase::Drifting { app_name: current, .. } = &mut self.phase {
                    *current = app_name.to_string();
                }
                self.check(now)
            }
            (true, false) => {
                if let Phase::Drifting { since, nudges_sent, .. } = &self.phase {
                    let drifted = (now - *since).max(0);
                    self.drift_seconds_today += drifted;
                    info!(
                        drift_seconds = drifted,
                        nudges = *nudges_sent,
                        "drift session ended"
                    );
                }
                self.phase = Phase::Idle;
                None
            }
            (false, false) => None,
        }
    }

    pub fn tick(&mut self, now: i64) -> Option<Nudge> {
        match self.phase {
            Phase::Drifting { .. } => self.check(now),
            Phase::Idle => None,
        }
    }

    pub fn drift_seconds_today(&self) -> i64 {
        self.drift_seconds_today
    }

    pub fn reset_day(&mut self) {
        self.drift_seconds_today = 0;
    }

    fn check(&mut self, now: i64) -> Option<Nudge> {
        if !self.config.nudge_enabled {
            return None;
        }

        let threshold = (self.config.nudge_threshold_minutes * 60) as i64;
        let cooldown = (self.config.nudge_cooldown_minutes * 60) as i64;

        let Phase::Drifting {
            since,
            app_name,
            last_nudge_at,
            nudges_sent,
        } = &mut self.phase
        else {
            return None;
        };

        let drifted = now - *since;
        if drifted < threshold {
            return None;
        }
        if let Some(last) = last_nudge_at {
            if now - *last < cooldown {
                return None;
            }
        }

        let drift_minutes = drifted / 60;
        let message = compose_message(&self.config, app_name, drift_minutes, now);

        *last_nudge_at = Some(now);
        *nudges_sent += 1;
        info!(app = %app_name, drift_minutes, "nudge fired");

        Some(Nudge {
            message,
            app_name: app_name.clone(),
            drift_minutes,
            fired_at: now,
        })
    }
}

fn compose_message(config: &Config, app_name: &str, drift_minutes: i64, now: i64) -> String {
    if config.ai_enabled && ai::has_api_key(config) {
        match ai::generate_nudge(config, app_name, drift_minutes) {
            Ok(message) => return message,
            Err(error) => {
                warn!(error = %error, "AI nudge generation failed, using fallback");
            }
        }
    }

    FALLBACK_NUDGES[(now.unsigned_abs() as usize) % FALLBACK_NUDGES.len()].to_string()
}
