//! Daemon configuration.
//!
//! The configuration lives in `simtrace.yaml` (or the path given as the
//! first command-line argument). Every section is optional and every field
//! has a default, so an empty file is a valid configuration.
//!
//! Environment variables override infrastructure values:
//! - `SIMTRACE_STORE_URL` overrides `store.url`
//! - `SIMTRACE_POOL_SIZE` overrides `store.pool_size`

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use simtrace_replay::ReplayDefaults;
use simtrace_store::StoreConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level daemon configuration. Mirrors the structure of `simtrace.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DaemonConfig {
    /// Event store connection and encoding.
    #[serde(default)]
    pub store: StoreConfig,

    /// Replay limits.
    #[serde(default)]
    pub replay: ReplayDefaults,

    /// Scheduled retention cleanup.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DaemonConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.store.apply_env_overrides();
        Ok(config)
    }
}

/// Scheduled retention cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetentionConfig {
    /// Whether the daemon runs cleanup at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between cleanup passes.
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    /// Events older than this many days are removed.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_interval_seconds(),
            max_age_days: default_max_age_days(),
        }
    }
}

impl RetentionConfig {
    /// Cleanup period, never shorter than one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_interval_seconds() -> u64 {
    3600
}

const fn default_max_age_days() -> u32 {
    30
}

fn default_log_level() -> String {
    "info".to_owned()
}
