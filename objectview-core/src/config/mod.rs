//! Configuration management for ObjectView
//!
//! Defaults, TOML files and `OBJECTVIEW_*` environment overrides, with
//! validation applied to every loaded configuration.

use crate::core_sync::backoff::JitterWindow;
use humantime_serde::re::humantime;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Hub endpoint requiring authentication
pub const AUTHENTICATED_HUB: &str = "/SmartSpace/ObjectView";

/// Hub endpoint allowing anonymous access
pub const ANONYMOUS_HUB: &str = "/SmartSpace/ObjectViewAnon";

/// Main client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hub connection
    pub hub: HubConfig,

    /// Rebind, reconnect and channel sizing
    pub sync: SyncConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Hub connection configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Explicit hub address; overrides `anonymous` when set
    pub address: Option<String>,

    /// Use the anonymous-access hub
    pub anonymous: bool,
}

impl HubConfig {
    /// The hub URL the transport should connect to
    pub fn endpoint(&self) -> &str {
        match self.address.as_deref() {
            Some(address) if !address.is_empty() => address,
            _ if self.anonymous => ANONYMOUS_HUB,
            _ => AUTHENTICATED_HUB,
        }
    }
}

/// Sync coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Delay window coalescing rebind requests
    pub rebind_window: JitterWindow,

    /// Delay window before a reconnect attempt
    pub reconnect_window: JitterWindow,

    /// Capacity of the coordinator command channel
    pub command_capacity: usize,

    /// Per-observer capacity of replica change notifications
    pub notify_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            rebind_window: JitterWindow::default(),
            reconnect_window: JitterWindow::default(),
            command_capacity: 64,
            notify_capacity: 256,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue { key: key.to_string(), message: e.to_string() })
}

fn parse_duration(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim())
        .map_err(|e| ConfigError::InvalidValue { key: key.to_string(), message: e.to_string() })
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: OBJECTVIEW_<SECTION>_<KEY>
    /// Example: OBJECTVIEW_SYNC_REBIND_MAX=2s
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from any `OBJECTVIEW_*` lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Hub config
        if let Some(address) = lookup("OBJECTVIEW_HUB_ADDRESS") {
            self.hub.address = Some(address).filter(|a| !a.is_empty());
        }
        if let Some(raw) = lookup("OBJECTVIEW_HUB_ANONYMOUS") {
            self.hub.anonymous = parse_var("OBJECTVIEW_HUB_ANONYMOUS", &raw)?;
        }

        // Sync config
        if let Some(raw) = lookup("OBJECTVIEW_SYNC_REBIND_MIN") {
            self.sync.rebind_window.min = parse_duration("OBJECTVIEW_SYNC_REBIND_MIN", &raw)?;
        }
        if let Some(raw) = lookup("OBJECTVIEW_SYNC_REBIND_MAX") {
            self.sync.rebind_window.max = parse_duration("OBJECTVIEW_SYNC_REBIND_MAX", &raw)?;
        }
        if let Some(raw) = lookup("OBJECTVIEW_SYNC_RECONNECT_MIN") {
            self.sync.reconnect_window.min = parse_duration("OBJECTVIEW_SYNC_RECONNECT_MIN", &raw)?;
        }
        if let Some(raw) = lookup("OBJECTVIEW_SYNC_RECONNECT_MAX") {
            self.sync.reconnect_window.max = parse_duration("OBJECTVIEW_SYNC_RECONNECT_MAX", &raw)?;
        }
        if let Some(raw) = lookup("OBJECTVIEW_SYNC_COMMAND_CAPACITY") {
            self.sync.command_capacity = parse_var("OBJECTVIEW_SYNC_COMMAND_CAPACITY", &raw)?;
        }
        if let Some(raw) = lookup("OBJECTVIEW_SYNC_NOTIFY_CAPACITY") {
            self.sync.notify_capacity = parse_var("OBJECTVIEW_SYNC_NOTIFY_CAPACITY", &raw)?;
        }

        // Logging config
        if let Some(level) = lookup("OBJECTVIEW_LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        if let Some(raw) = lookup("OBJECTVIEW_LOG_JSON") {
            self.logging.json_format = parse_var("OBJECTVIEW_LOG_JSON", &raw)?;
        }

        Ok(())
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;

        let config: Self = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sync.rebind_window.is_valid() {
            return Err(ConfigError::ValidationFailed(
                "rebind_window.min must not exceed rebind_window.max".to_string(),
            ));
        }

        if !self.sync.reconnect_window.is_valid() {
            return Err(ConfigError::ValidationFailed(
                "reconnect_window.min must not exceed reconnect_window.max".to_string(),
            ));
        }

        if self.sync.command_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "command_capacity must be greater than 0".to_string(),
            ));
        }

        if self.sync.notify_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "notify_capacity must be greater than 0".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;

        std::fs::write(path, contents)
            .map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })?;

        Ok(())
    }
}
