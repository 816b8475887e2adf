//! Logging subsystem for ObjectView
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` (RUST_LOG
//! wins over the configured level) and either a human-readable or JSON
//! formatting layer.

use crate::config::LoggingConfig;
use std::io;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod error;
mod level;

pub use error::LoggingError;
pub use level::LogLevel;

/// Subscriber settings, usually built from the `[logging]` config section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Default filter when RUST_LOG is unset
    pub level: LogLevel,
    pub with_timestamp: bool,
    /// Print the emitting module path
    pub with_target: bool,
    /// One JSON object per line instead of human-readable text
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_timestamp: true,
            with_target: true,
            json_format: false,
        }
    }
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self { level, ..Default::default() }
    }

    pub fn with_timestamp(mut self, enabled: bool) -> Self {
        self.with_timestamp = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }
}

impl TryFrom<&LoggingConfig> for LogConfig {
    type Error = LoggingError;

    fn try_from(config: &LoggingConfig) -> Result<Self, Self::Error> {
        Ok(LogConfig::new(config.level.parse()?)
            .with_timestamp(config.with_timestamp)
            .with_target(config.with_target)
            .json_format(config.json_format))
    }
}

/// Initialize the logging subsystem with default configuration
///
/// # Example
/// ```
/// use objectview_core::logging::init_logging;
///
/// init_logging().expect("Failed to initialize logging");
/// ```
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::default())
}

/// Initialize the logging subsystem with custom configuration
///
/// # Example
/// ```
/// use objectview_core::logging::{init_logging_with_config, LogConfig, LogLevel};
///
/// let config = LogConfig::new(LogLevel::Debug).with_target(false);
/// init_logging_with_config(config).expect("Failed to initialize logging");
/// ```
pub fn init_logging_with_config(config: LogConfig) -> Result<(), LoggingError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    // Logs go to stderr; stdout belongs to the caller's output.
    let layer = match (config.json_format, config.with_timestamp) {
        (true, true) => fmt::layer().with_writer(io::stderr).json().with_target(config.with_target).boxed(),
        (true, false) => fmt::layer().with_writer(io::stderr).json().without_time().with_target(config.with_target).boxed(),
        (false, true) => fmt::layer().with_writer(io::stderr).with_target(config.with_target).boxed(),
        (false, false) => fmt::layer().with_writer(io::stderr).without_time().with_target(config.with_target).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))
}
