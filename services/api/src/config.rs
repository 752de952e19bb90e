//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use chrono::{FixedOffset, NaiveTime};
use std::net::SocketAddr;
use study_tracker_core::clock::{DEFAULT_CUTOFF_HOUR, DEFAULT_UTC_OFFSET_HOURS};
use study_tracker_core::StudyDayClock;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which `UserStore` implementation backs the service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres { database_url: String },
    /// Process-local, lost on restart.
    Memory,
}

/// Local fire times for the in-process reminder timer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReminderTimes {
    pub unchecked_notice: NaiveTime,
    pub midday_reminder: NaiveTime,
    pub late_reminder: NaiveTime,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub store: StoreBackend,
    pub line_channel_access_token: String,
    pub line_channel_secret: String,
    pub line_api_base: String,
    pub cutoff_hour: u32,
    pub utc_offset: FixedOffset,
    pub reminder_timer_enabled: bool,
    pub reminder_times: ReminderTimes,
    pub expose_user_list: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. `from_env` passes the process
    /// environment; tests pass a map.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &str| var(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()));
        let invalid = |key: &str, reason: String| ConfigError::InvalidValue(key.to_string(), reason);

        // --- Server Settings ---
        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| invalid("BIND_ADDRESS", e.to_string()))?;

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            invalid(
                "RUST_LOG",
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Storage ---
        let store = match var("STORE_BACKEND").as_deref().unwrap_or("postgres") {
            "postgres" => StoreBackend::Postgres {
                database_url: required("DATABASE_URL")?,
            },
            "memory" => StoreBackend::Memory,
            other => {
                return Err(invalid(
                    "STORE_BACKEND",
                    format!("'{}' is not one of postgres, memory", other),
                ))
            }
        };

        // --- LINE Messaging API ---
        let line_channel_access_token = required("LINE_CHANNEL_ACCESS_TOKEN")?;
        let line_channel_secret = required("LINE_CHANNEL_SECRET")?;
        let line_api_base = var("LINE_API_BASE")
            .unwrap_or_else(|| "https://api.line.me".to_string())
            .trim_end_matches('/')
            .to_string();

        // --- Study Day ---
        let cutoff_hour = match var("STUDY_DAY_CUTOFF_HOUR") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|h| *h < 24)
                .ok_or_else(|| invalid("STUDY_DAY_CUTOFF_HOUR", format!("'{}' is not an hour 0-23", raw)))?,
            None => DEFAULT_CUTOFF_HOUR,
        };
        let offset_hours = match var("STUDY_DAY_UTC_OFFSET_HOURS") {
            Some(raw) => raw
                .parse::<i32>()
                .map_err(|e| invalid("STUDY_DAY_UTC_OFFSET_HOURS", e.to_string()))?,
            None => DEFAULT_UTC_OFFSET_HOURS,
        };
        let utc_offset = (-12..=14)
            .contains(&offset_hours)
            .then(|| FixedOffset::east_opt(offset_hours * 3600))
            .flatten()
            .ok_or_else(|| {
                invalid(
                    "STUDY_DAY_UTC_OFFSET_HOURS",
                    format!("{} is outside -12..=14", offset_hours),
                )
            })?;

        // --- Reminders ---
        let reminder_timer_enabled = parse_flag(&var, "REMINDER_TIMER_ENABLED")?;
        let time_of_day = |key: &str, default: &str| -> Result<NaiveTime, ConfigError> {
            let raw = var(key).unwrap_or_else(|| default.to_string());
            NaiveTime::parse_from_str(&raw, "%H:%M").map_err(|e| invalid(key, e.to_string()))
        };
        let reminder_times = ReminderTimes {
            unchecked_notice: time_of_day("UNCHECKED_NOTICE_AT", "04:00")?,
            midday_reminder: time_of_day("MIDDAY_REMINDER_AT", "22:00")?,
            late_reminder: time_of_day("LATE_REMINDER_AT", "23:30")?,
        };

        let expose_user_list = parse_flag(&var, "EXPOSE_USER_LIST")?;

        Ok(Self {
            bind_address,
            log_level,
            store,
            line_channel_access_token,
            line_channel_secret,
            line_api_base,
            cutoff_hour,
            utc_offset,
            reminder_timer_enabled,
            reminder_times,
            expose_user_list,
        })
    }

    pub fn study_day_clock(&self) -> StudyDayClock {
        StudyDayClock::new(self.cutoff_hour, self.utc_offset)
    }
}

fn parse_flag(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool, ConfigError> {
    match var(key).as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("") | Some("false") | Some("0") => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some(other) => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("'{}' is not a boolean", other),
        )),
    }
}
