//! Configuration management for airquality-exporter.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::{ServerConfig, DEFAULT_LISTEN_ADDRESS};
use crate::cli::Args;
use crate::logging;
use crate::session::{
    BoundedRetry, SessionConfig, DEFAULT_CALL_TIMEOUT, DEFAULT_CYCLE, DEFAULT_PORT_PATH,
    DEFAULT_RETRIES,
};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP configuration.
    pub web: WebSection,
    /// Sensor configuration.
    pub sensor: SensorSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// HTTP configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSection {
    /// Address to listen on, `host:port` or `:port`.
    pub listen_address: String,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
        }
    }
}

/// Sensor configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSection {
    /// Serial port path.
    pub port_path: String,
    /// Cycle length in minutes.
    pub cycle: u8,
    /// Write the cycle on every start.
    pub force_set_cycle: bool,
    /// Retries for the passive-mode switch.
    pub retries: u32,
    /// Timeout of one passive-mode attempt, in seconds.
    pub call_timeout_secs: u64,
}

impl Default for SensorSection {
    fn default() -> Self {
        Self {
            port_path: DEFAULT_PORT_PATH.to_string(),
            cycle: DEFAULT_CYCLE,
            force_set_cycle: true,
            retries: DEFAULT_RETRIES,
            call_timeout_secs: DEFAULT_CALL_TIMEOUT.as_secs(),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(addr) = std::env::var("AIRQUALITY_LISTEN_ADDRESS") {
            self.web.listen_address = addr;
        }

        if let Ok(path) = std::env::var("AIRQUALITY_PORT_PATH") {
            self.sensor.port_path = path;
        }

        if let Ok(cycle) = std::env::var("AIRQUALITY_CYCLE") {
            self.sensor.cycle = cycle
                .parse()
                .map_err(|_| ConfigError::InvalidValue("AIRQUALITY_CYCLE", cycle))?;
        }

        if let Ok(level) = std::env::var("AIRQUALITY_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref addr) = args.listen_address {
            self.web.listen_address = addr.clone();
        }

        if let Some(ref path) = args.port_path {
            self.sensor.port_path = path.clone();
        }

        if let Some(cycle) = args.cycle {
            self.sensor.cycle = cycle;
        }

        if let Some(force) = args.force_set_cycle {
            self.sensor.force_set_cycle = force;
        }

        if args.verbose {
            self.logging.level = logging::VERBOSE_LEVEL.to_string();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env()?;
        config.apply_args(args);

        Ok(config)
    }

    /// Convert to the sensor session configuration.
    ///
    /// A call timeout of zero is rejected.
    pub fn to_session_config(&self) -> Result<SessionConfig, ConfigError> {
        if self.sensor.call_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "sensor.call_timeout_secs",
                self.sensor.call_timeout_secs.to_string(),
            ));
        }
        let retry = BoundedRetry::new(
            self.sensor.retries,
            Duration::from_secs(self.sensor.call_timeout_secs),
        );
        Ok(SessionConfig::new(self.sensor.port_path.clone())
            .with_cycle(self.sensor.cycle)
            .with_force_set_cycle(self.sensor.force_set_cycle)
            .with_retry(retry))
    }

    /// Convert to the HTTP server configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let config = ServerConfig::new(self.web.listen_address.clone());
        config
            .bind_address()
            .map_err(|_| ConfigError::InvalidListenAddress(self.web.listen_address.clone()))?;
        Ok(config)
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Invalid listen address.
    InvalidListenAddress(String),
    /// Environment variable with an unusable value.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidListenAddress(addr) => write!(f, "invalid listen address: {}", addr),
            Self::InvalidValue(name, value) => write!(f, "invalid value for {}: '{}'", name, value),
        }
    }
}

impl std::error::Error for ConfigError {}
