//! Runtime configuration resolved from environment variables.
//!
//! # Invariants
//! - Blank values count as unset and fall back to defaults.
//! - Malformed or zero capacities are rejected instead of silently clamped.

use crate::coordinator::CoordinatorOptions;
use crate::logging::default_log_level;
use crate::summarizer::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const ENV_DB_PATH: &str = "NOTETAKER_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "NOTETAKER_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "NOTETAKER_LOG_DIR";
pub const ENV_SUMMARIZER_URL: &str = "NOTETAKER_SUMMARIZER_URL";
pub const ENV_SUMMARIZER_MODEL: &str = "NOTETAKER_SUMMARIZER_MODEL";
pub const ENV_QUEUE_CAPACITY: &str = "NOTETAKER_QUEUE_CAPACITY";
pub const ENV_BROADCAST_CAPACITY: &str = "NOTETAKER_BROADCAST_CAPACITY";

const DB_FILE_NAME: &str = "notetaker.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidNumber { key: &'static str, value: String },
    ZeroCapacity(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNumber { key, value } => {
                write!(f, "`{key}` must be a positive integer, got `{value}`")
            }
            Self::ZeroCapacity(key) => write!(f, "`{key}` must be greater than zero"),
        }
    }
}

impl Error for ConfigError {}

/// Summarizer endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarizerConfig {
    pub base_url: String,
    pub model: String,
}

/// Process-wide settings for the coordinator host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub db_path: PathBuf,
    pub log_level: String,
    /// File logging is enabled only when set.
    pub log_dir: Option<PathBuf>,
    pub summarizer: SummarizerConfig,
    pub coordinator: CoordinatorOptions,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: std::env::temp_dir().join(DB_FILE_NAME),
            log_level: default_log_level().to_string(),
            log_dir: None,
            summarizer: SummarizerConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
                model: DEFAULT_MODEL.to_string(),
            },
            coordinator: CoordinatorOptions::default(),
        }
    }
}

impl CoreConfig {
    /// Resolves configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves configuration through `lookup`, which maps a key to its raw value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            db_path: read(ENV_DB_PATH).map_or(defaults.db_path, PathBuf::from),
            log_level: read(ENV_LOG_LEVEL).unwrap_or(defaults.log_level),
            log_dir: read(ENV_LOG_DIR).map(PathBuf::from),
            summarizer: SummarizerConfig {
                base_url: read(ENV_SUMMARIZER_URL).unwrap_or(defaults.summarizer.base_url),
                model: read(ENV_SUMMARIZER_MODEL).unwrap_or(defaults.summarizer.model),
            },
            coordinator: CoordinatorOptions {
                queue_capacity: parse_capacity(
                    ENV_QUEUE_CAPACITY,
                    read(ENV_QUEUE_CAPACITY),
                    defaults.coordinator.queue_capacity,
                )?,
                broadcast_capacity: parse_capacity(
                    ENV_BROADCAST_CAPACITY,
                    read(ENV_BROADCAST_CAPACITY),
                    defaults.coordinator.broadcast_capacity,
                )?,
            },
        })
    }
}

fn parse_capacity(
    key: &'static str,
    raw: Option<String>,
    default: usize,
) -> Result<usize, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value = raw
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidNumber { key, value: raw })?;
    if value == 0 {
        return Err(ConfigError::ZeroCapacity(key));
    }
    Ok(value)
}
