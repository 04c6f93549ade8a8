//! Runtime configuration loaded from TOML.
//!
//! Every section and field has a default, so an empty file (or no file) is
//! a valid configuration. `MEDFINDER_DATABASE` overrides `database.path`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::aggregation::DOMINANCE_THRESHOLD;

/// Environment variable overriding the database path.
pub const DATABASE_ENV: &str = "MEDFINDER_DATABASE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub housekeeping: HousekeepingConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("medfinder.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregationConfig {
    /// Share of reports a bucket needs to dominate, in (0, 1]
    #[serde(default = "default_threshold")]
    pub dominance_threshold: f64,
}

fn default_threshold() -> f64 {
    DOMINANCE_THRESHOLD
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            dominance_threshold: default_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    #[serde(default = "default_distance_miles")]
    pub default_distance_miles: f64,
}

fn default_distance_miles() -> f64 {
    10.0
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_distance_miles: default_distance_miles(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub throttle_ms: u64,
}

fn default_batch_size() -> usize {
    500
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            throttle_ms: 0,
        }
    }
}

impl ImportConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HousekeepingConfig {
    #[serde(default = "default_inactive_after_days")]
    pub inactive_after_days: i64,
}

fn default_inactive_after_days() -> i64 {
    30
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            inactive_after_days: default_inactive_after_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportConfig {
    #[serde(default = "default_export_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_retention_hours")]
    pub retention_hours: i64,
}

fn default_export_directory() -> PathBuf {
    PathBuf::from("exports")
}

fn default_retention_hours() -> i64 {
    24
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: default_export_directory(),
            retention_hours: default_retention_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Parse TOML text and validate it.
    pub fn from_toml(text: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given (and existing), then apply env overrides.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p).map_err(|source| ConfigError::Read {
                    path: p.to_path_buf(),
                    source,
                })?;
                toml::from_str(&text)?
            }
            _ => Config::default(),
        };
        if let Ok(db_path) = std::env::var(DATABASE_ENV) {
            if !db_path.trim().is_empty() {
                config.database.path = PathBuf::from(db_path);
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let threshold = self.aggregation.dominance_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::Invalid(
                "aggregation.dominance_threshold must be in (0, 1]".into(),
            ));
        }
        if !(self.search.default_distance_miles > 0.0) {
            return Err(ConfigError::Invalid(
                "search.default_distance_miles must be > 0".into(),
            ));
        }
        if self.housekeeping.inactive_after_days <= 0 {
            return Err(ConfigError::Invalid(
                "housekeeping.inactive_after_days must be > 0".into(),
            ));
        }
        if self.export.retention_hours <= 0 {
            return Err(ConfigError::Invalid(
                "export.retention_hours must be > 0".into(),
            ));
        }
        let level = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of {:?}",
                valid_levels
            )));
        }
        Ok(())
    }
}
