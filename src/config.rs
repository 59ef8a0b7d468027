use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveTime;
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const APP_DIR: &str = ".signaltrack";
const CONFIG_FILE: &str = "config.json";
const DEFAULT_ROLLUP_TIME: &str = "23:55";
pub const FIXED_POLLING_SECONDS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub polling_seconds: u64,
    pub db_path: PathBuf,
    pub api_port: u16,
    pub retention_days: u32,
    pub rollup_time: String,
    pub daemon_label: String,
    pub cache_ttl_seconds: u64,
    pub nudge_enabled: bool,
    pub nudge_threshold_minutes: u64,
    pub nudge_cooldown_minutes: u64,
    pub ai_enabled: bool,
    pub ai_api_key: Option<String>,
    pub ai_api_base_url: String,
    pub ai_model: String,
    pub ai_timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        let root = default_root_dir();

        Self {
            polling_seconds: FIXED_POLLING_SECONDS,
            db_path: root.join("db").join("signaltrack.db"),
            api_port: 7320,
            retention_days: 90,
            rollup_time: DEFAULT_ROLLUP_TIME.to_string(),
            daemon_label: "com.signaltrack.daemon".to_string(),
            cache_ttl_seconds: 60,
            nudge_enabled: true,
            nudge_threshold_minutes: 10,
            nudge_cooldown_minutes: 5,
            ai_enabled: false,
            ai_api_key: None,
            ai_api_base_url: "https://api.openai.com/v1".to_string(),
            ai_model: "gpt-4o-mini".to_string(),
            ai_timeout_seconds: 20,
        }
    }
}

impl Config {
    pub fn root_dir() -> Result<PathBuf> {
        Ok(default_root_dir())
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(default_root_dir().join(CONFIG_FILE))
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.polling_seconds = FIXED_POLLING_SECONDS;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        restrict_to_owner(&config_path)?;

        Ok(())
    }

    pub fn ensure_bootstrap_files(&self) -> Result<()> {
        let root = Self::root_dir()?;
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create root directory: {}", root.display()))?;

        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        Ok(())
    }

    pub fn parse_rollup_time(&self) -> Result<NaiveTime> {
        parse_hhmm(&self.rollup_time)
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match normalize_config_key(key) {
            "polling_seconds" => {
                let parsed = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("polling_seconds must be a number"))?;
                if parsed != FIXED_POLLING_SECONDS {
                    bail!("polling_seconds is fixed to 5 seconds");
                }
                self.polling_seconds = parsed;
            }
            "rollup_time" => {
                parse_hhmm(value)?;
                self.rollup_time = value.to_string();
            }
            "api_port" => {
                self.api_port = value
                    .parse::<u16>()
                    .map_err(|_| anyhow!("api_port must be a number"))?;
            }
            "retention_days" => {
                self.retention_days = value
                    .parse::<u32>()
                    .map_err(|_| anyhow!("retention_days must be a number"))?;
            }
            "cache_ttl_seconds" => {
                self.cache_ttl_seconds = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("cache_ttl_seconds must be a number"))?
                    .max(5);
            }
            "nudge_enabled" => {
                self.nudge_enabled = value
                    .parse::<bool>()
                    .map_err(|_| anyhow!("nudge_enabled must be true/false"))?;
            }
            "nudge_threshold_minutes" => {
                self.nudge_threshold_minutes = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("nudge_threshold_minutes must be a number"))?
                    .max(1);
            }
            "nudge_cooldown_minutes" => {
                self.nudge_cooldown_minutes = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("nudge_cooldown_minutes must be a number"))?
                    .max(1);
            }
            "ai_enabled" => {
                self.ai_enabled = value
                    .parse::<bool>()
                    .map_err(|_| anyhow!("ai_enabled must be true/false"))?;
            }
            "ai_api_key" => {
                self.ai_api_key = (!value.trim().is_empty()).then_some(value.to_string());
            }
            "ai_api_base_url" => {
                self.ai_api_base_url = value.trim().trim_end_matches('/').to_string();
            }
            "ai_model" => {
                self.ai_model = value.trim().to_string();
            }
            "ai_timeout_seconds" => {
                self.ai_timeout_seconds = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("ai_timeout_seconds must be a number"))?
                    .max(5);
            }
            _ => {
                bail!(
                    "Unsupported config key: {key}. Supported keys: polling_seconds|monitor.interval_seconds, rollup_time|score.rollup_time, api_port|api.port, retention_days|retention.days, cache_ttl_seconds|classifier.cache_ttl_seconds, nudge_enabled|nudge.enabled, nudge_threshold_minutes|nudge.threshold_minutes, nudge_cooldown_minutes|nudge.cooldown_minutes, ai_enabled|ai.enabled, ai_api_key|ai.api_key, ai_api_base_url|ai.base_url, ai_model|ai.model, ai_timeout_seconds|ai.timeout_seconds"
                );
            }
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        match normalize_config_key(key) {
            "polling_seconds" => Some(self.polling_seconds.to_string()),
            "db_path" => Some(self.db_path.display().to_string()),
            "api_port" => Some(self.api_port.to_string()),
            "retention_days" => Some(self.retention_days.to_string()),
            "rollup_time" => Some(self.rollup_time.clone()),
            "daemon_label" => Some(self.daemon_label.clone()),
            "cache_ttl_seconds" => Some(self.cache_ttl_seconds.to_string()),
            "nudge_enabled" => Some(self.nudge_enabled.to_string()),
            "nudge_threshold_minutes" => Some(self.nudge_threshold_minutes.to_string()),
            "nudge_cooldown_minutes" => Some(self.nudge_cooldown_minutes.to_string()),
            "ai_enabled" => Some(self.ai_enabled.to_string()),
            "ai_api_key" => Some(
                self.ai_api_key
                    .as_ref()
                    .map(|_| "***set***".to_string())
                    .unwrap_or_else(|| "not_set".to_string()),
            ),
            "ai_api_base_url" => Some(self.ai_api_base_url.clone()),
            "ai_model" => Some(self.ai_model.clone()),
            "ai_timeout_seconds" => Some(self.ai_timeout_seconds.to_string()),
            _ => None,
        }
    }
}

fn normalize_config_key(key: &str) -> &str {
    match key {
        "polling_seconds" | "monitor.interval_seconds" => "polling_seconds",
        "rollup_time" | "score.rollup_time" => "rollup_time",
        "api_port" | "api.port" => "api_port",
        "retention_days" | "retention.days" => "retention_days",
        "cache_ttl_seconds" | "classifier.cache_ttl_seconds" => "cache_ttl_seconds",
        "nudge_enabled" | "nudge.enabled" => "nudge_enabled",
        "nudge_threshold_minutes" | "nudge.threshold_minutes" => "nudge_threshold_minutes",
        "nudge_cooldown_minutes" | "nudge.cooldown_minutes" => "nudge_cooldown_minutes",
        "ai_enabled" | "ai.enabled" => "ai_enabled",
        "ai_api_key" | "ai.api_key" => "ai_api_key",
        "ai_api_base_url" | "ai.base_url" => "ai_api_base_url",
        "ai_model" | "ai.model" => "ai_model",
        "ai_timeout_seconds" | "ai.timeout_seconds" => "ai_timeout_seconds",
        "db_path" | "db.path" => "db_path",
        "daemon_label" | "daemon.label" => "daemon_label",
        _ => key,
    }
}

pub fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .with_context(|| format!("Invalid time format: {value}. Example: 23:55 (24-hour format)"))
}

fn default_root_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn restrict_to_owner(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set file permissions: {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn polling_interval_is_fixed() {
        let mut config = Config::default();
        assert!(config.set_value("polling_seconds", "300").is_err());
        assert!(config.set_value("polling_seconds", "5").is_ok());
    }

    #[test]
    fn rollup_time_is_validated() {
        let mut config = Config::default();
        assert!(config.set_value("rollup_time", "25:99").is_err());
        config.set_value("score.rollup_time", "22:15").expect("set");
        assert_eq!(config.rollup_time, "22:15");
    }

    #[test]
    fn nudge_thresholds_have_floors() {
        let mut config = Config::default();
        config.set_value("nudge.threshold_minutes", "0").expect("set");
        assert_eq!(config.nudge_threshold_minutes, 1);
        config.set_value("nudge.cooldown_minutes", "7").expect("set");
        assert_eq!(config.nudge_cooldown_minutes, 7);
    }

    #[test]
    fn api_key_is_masked_on_read() {
        let mut config = Config::default();
        assert_eq!(config.get_value("ai_api_key").as_deref(), Some("not_set"));
        config.set_value("ai.api_key", "sk-test").expect("set");
        assert_eq!(config.get_value("ai_api_key").as_deref(), Some("***set***"));
    }
}
