//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Check-in prompt frequency and jitter
//! - End-of-day summary time
//! - Snooze choices
//! - Report day start
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use std::path::PathBuf;

use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::timeutil::LocalZone;

/// Periodic check-in prompt and stale-session policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
    #[serde(default = "default_jitter_minutes")]
    pub jitter_minutes: u32,
    #[serde(default = "default_stale_session_hours")]
    pub stale_session_hours: u32,
}

/// End-of-day summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummaryConfig {
    /// Local wall-clock time, `HH:MM`.
    #[serde(default = "default_summary_time")]
    pub time: String,
    #[serde(default = "default_lead_seconds")]
    pub lead_seconds: u32,
    #[serde(default = "default_tolerance_seconds")]
    pub tolerance_seconds: u32,
}

/// Snooze button choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnoozeConfig {
    #[serde(default = "default_buffer_minutes")]
    pub buffer_minutes: u32,
    #[serde(default = "default_increment_minutes")]
    pub increment_minutes: u32,
    #[serde(default = "default_extra_options")]
    pub extra_options: u32,
    /// When the next working session starts, `HH:MM`.
    #[serde(default = "default_day_start")]
    pub day_start: String,
    #[serde(default)]
    pub include_weekends: bool,
}

/// Daily report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Default start of "today" in the report, `HH:MM`.
    #[serde(default = "default_report_day_start")]
    pub day_start: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Fixed local offset in minutes east of UTC; the system offset when unset.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
    #[serde(default)]
    pub reminders: ReminderConfig,
    #[serde(default)]
    pub daily_summary: DailySummaryConfig,
    #[serde(default)]
    pub snooze: SnoozeConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

// Default functions
fn default_interval_minutes() -> u32 {
    10
}
fn default_jitter_minutes() -> u32 {
    2
}
fn default_stale_session_hours() -> u32 {
    6
}
fn default_summary_time() -> String {
    "18:30".into()
}
fn default_lead_seconds() -> u32 {
    30
}
fn default_tolerance_seconds() -> u32 {
    60
}
fn default_buffer_minutes() -> u32 {
    10
}
fn default_increment_minutes() -> u32 {
    30
}
fn default_extra_options() -> u32 {
    3
}
fn default_day_start() -> String {
    "09:00".into()
}
fn default_report_day_start() -> String {
    "07:00".into()
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            jitter_minutes: default_jitter_minutes(),
            stale_session_hours: default_stale_session_hours(),
        }
    }
}

impl Default for DailySummaryConfig {
    fn default() -> Self {
        Self {
            time: default_summary_time(),
            lead_seconds: default_lead_seconds(),
            tolerance_seconds: default_tolerance_seconds(),
        }
    }
}

impl Default for SnoozeConfig {
    fn default() -> Self {
        Self {
            buffer_minutes: default_buffer_minutes(),
            increment_minutes: default_increment_minutes(),
            extra_options: default_extra_options(),
            day_start: default_day_start(),
            include_weekends: false,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            day_start: default_report_day_start(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            utc_offset_minutes: None,
            reminders: ReminderConfig::default(),
            daily_summary: DailySummaryConfig::default(),
            snooze: SnoozeConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl DailySummaryConfig {
    pub fn wall_time(&self) -> Result<NaiveTime, ConfigError> {
        parse_hhmm("daily_summary.time", &self.time)
    }

    /// Never less than twice the lead, so the timer can still land before
    /// the advertised time.
    pub fn tolerance_seconds(&self) -> u32 {
        self.tolerance_seconds.max(self.lead_seconds.saturating_mul(2))
    }
}

impl SnoozeConfig {
    pub fn day_start_time(&self) -> Result<NaiveTime, ConfigError> {
        parse_hhmm("snooze.day_start", &self.day_start)
    }
}

impl ReportConfig {
    pub fn day_start_time(&self) -> Result<NaiveTime, ConfigError> {
        parse_hhmm("report.day_start", &self.day_start)
    }
}

fn parse_hhmm(key: &str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected HH:MM, got '{value}' ({e})"),
    })
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;
            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                ),
                serde_json::Value::Number(_) => {
                    let n = value
                        .parse::<i64>()
                        .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                    serde_json::Value::Number(n.into())
                }
                // Optional numbers are stored as null until first set.
                serde_json::Value::Null => match value.parse::<i64>() {
                    Ok(n) => serde_json::Value::Number(n.into()),
                    Err(_) if value == "none" => serde_json::Value::Null,
                    Err(_) => return Err(invalid(format!("cannot parse '{value}' as number"))),
                },
                _ => serde_json::Value::String(value.into()),
            };
            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::from_toml(&content).map_err(|e| match e {
                ConfigError::InvalidValue { message, .. } => ConfigError::LoadFailed {
                    path: path.clone(),
                    message,
                },
                other => other,
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "using default configuration");
            Self::default()
        })
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(content).map_err(|e| ConfigError::InvalidValue {
            key: "<document>".into(),
            message: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check that every time-of-day string parses and intervals are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.daily_summary.wall_time()?;
        self.snooze.day_start_time()?;
        self.report.day_start_time()?;
        if self.reminders.interval_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "reminders.interval_minutes".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.reminders.jitter_minutes >= self.reminders.interval_minutes {
            return Err(ConfigError::InvalidValue {
                key: "reminders.jitter_minutes".into(),
                message: "must be smaller than the interval".into(),
            });
        }
        if self.snooze.increment_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "snooze.increment_minutes".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key, in memory. Callers persist with [`Config::save`].
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not parse
    /// or fails validation; `self` is left unchanged in that case.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |e: serde_json::Error| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        };
        let mut json = serde_json::to_value(&*self).map_err(invalid)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(invalid)?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Every leaf key with its current value, sorted by key.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (k, v) in map {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(&key, v, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out
    }

    /// Zone used for wall-clock scheduling and report days: the configured
    /// fixed offset, otherwise the system zone.
    pub fn local_zone(&self) -> LocalZone {
        self.utc_offset_minutes
            .and_then(|minutes| FixedOffset::east_opt(minutes.saturating_mul(60)))
            .map_or(LocalZone::System, LocalZone::Fixed)
    }
}
