//! Configuration loading and typed config structures for the Pricecast feed.
//!
//! The canonical configuration lives in `pricecast-config.yaml` next to the
//! binary's working directory. This module defines strongly-typed structs
//! that mirror the YAML structure, a loader that reads the file and applies
//! environment overrides, and [`PricecastConfig::validate`] which rejects
//! values the coordinator and generator cannot run with.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

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

    /// The configuration parsed but holds unusable values.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `pricecast-config.yaml`. All fields have
/// defaults, so an empty file (or no file at all) yields a runnable feed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PricecastConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// History and queue sizing for the coordinator.
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Sample generator parameters.
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PricecastConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `PRICECAST_HOST` overrides `server.host`
    /// - `PRICECAST_PORT` overrides `server.port`
    /// - `PRICECAST_LOG_FORMAT` overrides `logging.format`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if an override cannot be parsed.
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
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Override selected values with environment variables when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `PRICECAST_PORT` is not a port
    /// number or `PRICECAST_LOG_FORMAT` is not a known format.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("PRICECAST_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("PRICECAST_PORT") {
            self.server.port = val.parse().map_err(|e| ConfigError::Invalid {
                reason: format!("PRICECAST_PORT={val} is not a port: {e}"),
            })?;
        }
        if let Ok(val) = std::env::var("PRICECAST_LOG_FORMAT") {
            self.logging.format = LogFormat::from_name(&val).ok_or_else(|| ConfigError::Invalid {
                reason: format!("PRICECAST_LOG_FORMAT={val} must be `pretty` or `json`"),
            })?;
        }
        Ok(())
    }

    /// Check every section for values the feed cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broadcast.validate()?;
        self.generator.validate()
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Coordinator sizing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BroadcastConfig {
    /// Number of most recent samples kept for replay to new subscribers.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Pending events the coordinator queue holds before `publish` blocks
    /// the generator.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Outbound queue length per subscriber. Must exceed
    /// `history_capacity` so a full replay fits.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl BroadcastConfig {
    /// Validate queue and history sizing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if any size is zero or the
    /// subscriber buffer cannot hold a full history replay.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(invalid("broadcast.history_capacity must be at least 1"));
        }
        if self.event_buffer == 0 {
            return Err(invalid("broadcast.event_buffer must be at least 1"));
        }
        if self.subscriber_buffer <= self.history_capacity {
            return Err(invalid(
                "broadcast.subscriber_buffer must be greater than broadcast.history_capacity",
            ));
        }
        Ok(())
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            event_buffer: default_event_buffer(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

/// Sample generator parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratorConfig {
    /// Milliseconds between generated samples.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Value the generator starts from and returns to on reset.
    #[serde(default = "default_floor")]
    pub initial_value: f64,

    /// Lowest value the generator may emit.
    #[serde(default = "default_floor")]
    pub floor: f64,

    /// Highest value the generator may emit.
    #[serde(default = "default_ceiling")]
    pub ceiling: f64,

    /// Scale of the random component per square-root second.
    #[serde(default = "default_volatility")]
    pub volatility: f64,

    /// Scale of the trend component per second.
    #[serde(default = "default_drift_rate")]
    pub drift_rate: f64,

    /// Largest trend change applied on a single tick.
    #[serde(default = "default_max_trend_step")]
    pub max_trend_step: f64,

    /// Trend magnitude forced after a bound is hit.
    #[serde(default = "default_recovery_trend")]
    pub recovery_trend: f64,

    /// Seed for a reproducible sample sequence. `None` seeds from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl GeneratorConfig {
    /// The tick interval as a [`Duration`].
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Validate bounds and rates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(invalid("generator.tick_interval_ms must be at least 1"));
        }
        if !self.floor.is_finite() || !self.ceiling.is_finite() || self.floor >= self.ceiling {
            return Err(invalid("generator.floor must be finite and below generator.ceiling"));
        }
        if !(self.floor..=self.ceiling).contains(&self.initial_value) {
            return Err(invalid(
                "generator.initial_value must lie within [generator.floor, generator.ceiling]",
            ));
        }
        if !self.volatility.is_finite() || self.volatility < 0.0 {
            return Err(invalid("generator.volatility must be finite and non-negative"));
        }
        if !self.drift_rate.is_finite() || self.drift_rate < 0.0 {
            return Err(invalid("generator.drift_rate must be finite and non-negative"));
        }
        if !(0.0..=1.0).contains(&self.max_trend_step) {
            return Err(invalid("generator.max_trend_step must lie within [0, 1]"));
        }
        if !(self.recovery_trend > 0.0 && self.recovery_trend <= 1.0) {
            return Err(invalid("generator.recovery_trend must lie within (0, 1]"));
        }
        Ok(())
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            initial_value: default_floor(),
            floor: default_floor(),
            ceiling: default_ceiling(),
            volatility: default_volatility(),
            drift_rate: default_drift_rate(),
            max_trend_step: default_max_trend_step(),
            recovery_trend: default_recovery_trend(),
            seed: None,
        }
    }
}

/// Output format for the process logger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, one line per event.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parse a format name as used in YAML and `PRICECAST_LOG_FORMAT`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
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

fn invalid(reason: &str) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    8080
}

const fn default_history_capacity() -> usize {
    200
}

const fn default_event_buffer() -> usize {
    256
}

const fn default_subscriber_buffer() -> usize {
    512
}

const fn default_tick_interval_ms() -> u64 {
    50
}

const fn default_floor() -> f64 {
    10_000.0
}

const fn default_ceiling() -> f64 {
    15_000.0
}

const fn default_volatility() -> f64 {
    500.0
}

const fn default_drift_rate() -> f64 {
    100.0
}

const fn default_max_trend_step() -> f64 {
    0.05
}

const fn default_recovery_trend() -> f64 {
    0.5
}

fn default_log_level() -> String {
    String::from("info")
}
