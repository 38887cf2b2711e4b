//! Board configuration.
//!
//! Resolved once at startup and passed into the core; nothing reads the
//! environment after that.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::urgency::UrgencyThresholds;

pub const DB_PATH_ENV: &str = "TRAUMA_BOARD_DB";
pub const WARNING_DAYS_ENV: &str = "TRAUMA_BOARD_WARNING_DAYS";
pub const CRITICAL_DAYS_ENV: &str = "TRAUMA_BOARD_CRITICAL_DAYS";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not a whole number of days: {value:?}")]
    InvalidDays { name: &'static str, value: String },

    #[error("warning threshold ({warning}) must be below critical threshold ({critical})")]
    ThresholdOrder { warning: i64, critical: i64 },

    #[error("thresholds must not be negative")]
    NegativeThreshold,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration resolved at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoardConfig {
    database_path: Option<PathBuf>,
    urgency: UrgencyThresholds,
}

impl BoardConfig {
    /// `None` for the path keeps records in memory only.
    pub fn new(database_path: Option<PathBuf>, urgency: UrgencyThresholds) -> ConfigResult<Self> {
        if urgency.warning_days < 0 || urgency.critical_days < 0 {
            return Err(ConfigError::NegativeThreshold);
        }
        if urgency.warning_days >= urgency.critical_days {
            return Err(ConfigError::ThresholdOrder {
                warning: urgency.warning_days,
                critical: urgency.critical_days,
            });
        }

        Ok(Self {
            database_path,
            urgency,
        })
    }

    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any key lookup. Unset or blank keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = UrgencyThresholds::default();

        let database_path = get(DB_PATH_ENV).map(PathBuf::from);
        let warning_days = match get(WARNING_DAYS_ENV) {
            Some(value) => parse_days(WARNING_DAYS_ENV, value)?,
            None => defaults.warning_days,
        };
        let critical_days = match get(CRITICAL_DAYS_ENV) {
            Some(value) => parse_days(CRITICAL_DAYS_ENV, value)?,
            None => defaults.critical_days,
        };

        Self::new(
            database_path,
            UrgencyThresholds {
                warning_days,
                critical_days,
            },
        )
    }

    pub fn database_path(&self) -> Option<&Path> {
        self.database_path.as_deref()
    }

    pub fn urgency(&self) -> UrgencyThresholds {
        self.urgency
    }
}

fn parse_days(name: &'static str, value: String) -> ConfigResult<i64> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidDays { name, value })
}
