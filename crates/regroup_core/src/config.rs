//! Core runtime configuration.
//!
//! # Responsibility
//! - Hold the tunables of the relocation engine and the logging bootstrap.
//! - Apply `REGROUP_*` environment overrides on top of defaults.
//!
//! # Invariants
//! - A validated config has a noise epsilon in `(0, 1)` and a non-blank
//!   temporary id prefix.

use crate::logging::default_log_level;
use crate::relocation::noise::DEFAULT_NOISE_EPSILON;
use crate::relocation::temp_id::DEFAULT_TEMP_ID_PREFIX;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const ENV_NOISE_EPSILON: &str = "REGROUP_NOISE_EPSILON";
pub const ENV_TEMP_ID_PREFIX: &str = "REGROUP_TEMP_ID_PREFIX";
pub const ENV_LOG_LEVEL: &str = "REGROUP_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "REGROUP_LOG_DIR";

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidEpsilon(f64),
    InvalidTempIdPrefix(String),
    /// Environment variable is set but cannot be parsed.
    InvalidEnvValue { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEpsilon(value) => {
                write!(f, "noise epsilon must lie in (0, 1), got {value}")
            }
            Self::InvalidTempIdPrefix(prefix) => {
                write!(f, "temporary id prefix cannot be blank, got `{prefix}`")
            }
            Self::InvalidEnvValue { key, value } => {
                write!(f, "invalid value `{value}` for {key}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Logging bootstrap settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute directory for rolling log files; `None` disables file logging.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

/// Tunables shared by the dispatcher and the CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    /// Upper bound of the tie-breaking noise added to appended sort keys.
    pub noise_epsilon: f64,
    /// Reserved prefix of client-allocated record ids.
    pub temp_id_prefix: String,
    pub logging: LoggingConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            noise_epsilon: DEFAULT_NOISE_EPSILON,
            temp_id_prefix: DEFAULT_TEMP_ID_PREFIX.to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Builds a config from defaults plus process environment overrides.
    ///
    /// # Errors
    /// - Returns `InvalidEnvValue` when an override cannot be parsed.
    /// - Returns the `validate` error when the merged config is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |key: &'static str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(raw) = read(ENV_NOISE_EPSILON) {
            config.noise_epsilon = raw.parse().map_err(|_| ConfigError::InvalidEnvValue {
                key: ENV_NOISE_EPSILON,
                value: raw.clone(),
            })?;
        }
        if let Some(prefix) = read(ENV_TEMP_ID_PREFIX) {
            config.temp_id_prefix = prefix;
        }
        if let Some(level) = read(ENV_LOG_LEVEL) {
            config.logging.level = level;
        }
        if let Some(dir) = read(ENV_LOG_DIR) {
            config.logging.log_dir = Some(PathBuf::from(dir));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.noise_epsilon > 0.0 && self.noise_epsilon < 1.0) {
            return Err(ConfigError::InvalidEpsilon(self.noise_epsilon));
        }
        if self.temp_id_prefix.trim().is_empty() {
            return Err(ConfigError::InvalidTempIdPrefix(self.temp_id_prefix.clone()));
        }
        Ok(())
    }
}
