//! Sensor session configuration.

use super::retry::BoundedRetry;

/// Default serial device path.
pub const DEFAULT_PORT_PATH: &str = "/dev/ttyUSB0";

/// Default sensor cycle, in minutes.
pub const DEFAULT_CYCLE: u8 = 5;

/// Settings for one sensor session. Built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Serial device path.
    pub port_path: String,
    /// Desired cycle in minutes.
    pub cycle: u8,
    /// Write the cycle on every start, even when the sensor already has it.
    pub force_set_cycle: bool,
    /// Retry policy for the passive-mode transition.
    pub retry: BoundedRetry,
}

impl SessionConfig {
    /// Create a config for the given device with default settings.
    pub fn new(port_path: impl Into<String>) -> Self {
        Self {
            port_path: port_path.into(),
            ..Self::default()
        }
    }

    pub fn with_cycle(mut self, minutes: u8) -> Self {
        self.cycle = minutes;
        self
    }

    pub fn with_force_set_cycle(mut self, force: bool) -> Self {
        self.force_set_cycle = force;
        self
    }

    pub fn with_retry(mut self, retry: BoundedRetry) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port_path: DEFAULT_PORT_PATH.to_string(),
            cycle: DEFAULT_CYCLE,
            force_set_cycle: true,
            retry: BoundedRetry::default(),
        }
    }
}
