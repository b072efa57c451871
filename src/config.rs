use crate::errors::{Result, TrackerError};
use crate::monitoring::instrument::DEFAULT_HISTORY_CAPACITY;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub general: GeneralConfig,
    pub tracking: TrackingConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub float_lookup: FloatLookupConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub mode: String,
    /// Scanner endpoint returning the current gainers as a JSON array
    pub scanner_url: String,
    /// Recorded batches used in replay mode
    #[serde(default)]
    pub replay_file: Option<String>,
    /// Scanner rows kept per poll
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

fn default_max_rows() -> usize {
    100
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Percent move from entry that latches a ticker
    pub desired_pct_change: f64,
    pub poll_interval_seconds: u64,
    /// Sleep used after a cycle in which nothing changed
    #[serde(default = "default_idle_poll_interval")]
    pub idle_poll_interval_seconds: u64,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Number of ranked tickers logged after a re-sort
    #[serde(default = "default_display_top")]
    pub display_top: usize,
}

fn default_idle_poll_interval() -> u64 {
    10
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_display_top() -> usize {
    5
}

impl TrackingConfig {
    pub fn is_valid(&self) -> bool {
        self.desired_pct_change.is_finite()
            && self.desired_pct_change >= 0.0
            && self.history_capacity > 0
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Local wall-clock open, "HH:MM" or "HH:MM:SS"
    pub open_time: String,
    /// Local wall-clock close, "HH:MM" or "HH:MM:SS"
    pub close_time: String,
}

impl SessionConfig {
    pub fn open(&self) -> Result<NaiveTime> {
        parse_wall_clock(&self.open_time)
    }

    pub fn close(&self) -> Result<NaiveTime> {
        parse_wall_clock(&self.close_time)
    }
}

fn parse_wall_clock(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|e| TrackerError::ParseError(format!("Invalid session time {}: {}", value, e)))
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FloatLookupConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for FloatLookupConfig {
    fn default() -> Self {
        Self {
            api_url: "https://financialmodelingprep.com/stable/shares-float".to_string(),
            api_key: None,
            timeout_seconds: 5,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct NotificationsConfig {
    pub discord_bot_token: Option<String>,
    pub discord_user_id: Option<String>,
    #[serde(default)]
    pub alert_log: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ExportConfig {
    pub export_dir: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            TrackerError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse only; call `validate` once overrides have been applied
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.general.mode.as_str(), "live" | "replay") {
            return Err(TrackerError::ConfigError(
                "Invalid mode. Must be 'live' or 'replay'".to_string(),
            ));
        }

        if self.general.mode == "replay" && self.general.replay_file.is_none() {
            return Err(TrackerError::ConfigError(
                "replay mode requires general.replay_file".to_string(),
            ));
        }

        if !self.tracking.is_valid() {
            return Err(TrackerError::ConfigError(
                "Invalid tracking configuration".to_string(),
            ));
        }

        if self.session.open()? >= self.session.close()? {
            return Err(TrackerError::ConfigError(
                "session.open_time must be before session.close_time".to_string(),
            ));
        }

        Ok(())
    }

    /// Expand environment variables in configuration
    pub fn expand_env_vars(&mut self) -> Result<()> {
        self.float_lookup.api_key = expand_optional(self.float_lookup.api_key.take());
        self.notifications.discord_bot_token =
            expand_optional(self.notifications.discord_bot_token.take());
        self.notifications.discord_user_id =
            expand_optional(self.notifications.discord_user_id.take());
        self.export.export_dir = expand_optional(self.export.export_dir.take());

        if let Some(var_name) = env_placeholder(&self.general.scanner_url) {
            self.general.scanner_url = std::env::var(var_name).map_err(|_| {
                TrackerError::ConfigError(format!("Environment variable {} not set", var_name))
            })?;
        }

        Ok(())
    }
}

fn env_placeholder(value: &str) -> Option<&str> {
    if value.starts_with("${") && value.ends_with('}') {
        Some(&value[2..value.len() - 1])
    } else {
        None
    }
}

// Unset variables leave the optional value empty
fn expand_optional(value: Option<String>) -> Option<String> {
    match value {
        Some(v) => match env_placeholder(&v) {
            Some(var_name) => std::env::var(var_name).ok().filter(|s| !s.is_empty()),
            None => Some(v),
        },
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[general]
mode = "live"
scanner_url = "http://localhost:8080/gainers"

[tracking]
desired_pct_change = 20.0
poll_interval_seconds = 60

[session]
open_time = "08:30:30"
close_time = "15:00"

[logging]
level = "info"
"#;

    #[test]
    fn test_load_sample_config_with_defaults() {
        let config = Config::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.tracking.idle_poll_interval_seconds, 10);
        assert_eq!(config.tracking.history_capacity, 200);
        assert_eq!(config.tracking.display_top, 5);
        assert_eq!(config.float_lookup.timeout_seconds, 5);
        assert!(config.notifications.discord_bot_token.is_none());
        assert_eq!(
            config.session.open().unwrap(),
            NaiveTime::from_hms_opt(8, 30, 30).unwrap()
        );
        assert_eq!(
            config.session.close().unwrap(),
            NaiveTime::from_hms_opt(15, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_tracking_validation() {
        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        assert!(config.tracking.is_valid());

        // A zero threshold latches anything that has not fallen
        config.tracking.desired_pct_change = 0.0;
        assert!(config.tracking.is_valid());
        assert!(config.validate().is_ok());

        config.tracking.desired_pct_change = -5.0;
        assert!(!config.tracking.is_valid());
        assert!(config.validate().is_err());

        config.tracking.desired_pct_change = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_replay_mode_requires_file() {
        let replay = SAMPLE.replace("mode = \"live\"", "mode = \"replay\"");
        let mut config = Config::from_toml_str(&replay).unwrap();
        assert!(config.validate().is_err());

        // A mode override applied before validation rescues the file
        config.general.mode = "live".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_file_still_loads_for_overrides() {
        let zero_capacity = SAMPLE.replace(
            "poll_interval_seconds = 60",
            "poll_interval_seconds = 60\nhistory_capacity = 0",
        );
        let mut config = Config::from_toml_str(&zero_capacity).unwrap();
        assert!(config.validate().is_err());

        config.tracking.history_capacity = 50;
        assert!(config.validate().is_ok());
        assert_eq!(config.general.max_rows, 100);
    }

    #[test]
    fn test_session_window_must_be_ordered() {
        let inverted = SAMPLE.replace("close_time = \"15:00\"", "close_time = \"07:00\"");
        let config = Config::from_toml_str(&inverted).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_session_time_is_a_parse_error() {
        let garbled = SAMPLE.replace("open_time = \"08:30:30\"", "open_time = \"half past eight\"");
        let config = Config::from_toml_str(&garbled).unwrap();
        assert!(matches!(config.validate(), Err(TrackerError::ParseError(_))));
    }

    #[test]
    fn test_expand_optional_keeps_literals() {
        assert_eq!(
            expand_optional(Some("literal".to_string())),
            Some("literal".to_string())
        );
        assert_eq!(
            expand_optional(Some("${GAINER_TRACKER_SURELY_UNSET_VAR}".to_string())),
            None
        );
        assert_eq!(expand_optional(None), None);
    }
}
