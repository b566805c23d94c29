//! Error types for airquality-exporter.

use std::fmt;

use thiserror::Error;

/// Startup step that failed, used to label fatal session errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStep {
    /// Opening the serial device.
    Open,
    /// Switching the sensor to passive mode.
    Passive,
    /// Reading the configured cycle from the sensor.
    GetCycle,
    /// Writing the cycle to the sensor.
    SetCycle,
    /// Switching the sensor to active mode.
    Active,
}

impl fmt::Display for StartupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::Open => "cannot create sensor instance",
            Self::Passive => "cannot switch sensor to passive mode",
            Self::GetCycle => "cannot get current cycle",
            Self::SetCycle => "cannot set current cycle",
            Self::Active => "cannot switch sensor to active mode",
        };
        f.write_str(msg)
    }
}

/// Main error type for airquality-exporter operations.
#[derive(Error, Debug)]
pub enum ExporterError {
    /// Serial device could not be opened.
    #[error("cannot open sensor at {path}: {reason}")]
    SensorOpen { path: String, reason: String },

    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sensor replied with something unexpected.
    #[error("device error: {0}")]
    Device(String),

    /// Cycle outside the range the sensor accepts.
    #[error("invalid cycle {0}: sensor accepts 0-30 minutes")]
    InvalidCycle(u8),

    /// Device call did not answer in time.
    #[error("device API response timeout (attempt {attempt})")]
    Timeout { attempt: u32 },

    /// Device call gave up because its caller stopped waiting.
    #[error("device call cancelled")]
    Cancelled,

    /// Background task panicked or was dropped.
    #[error("background task failed: {0}")]
    Task(String),

    /// Fatal failure during session startup.
    #[error("{step}: {source}")]
    Startup {
        step: StartupStep,
        #[source]
        source: Box<ExporterError>,
    },

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::session::SessionState,
        to: crate::session::SessionState,
    },

    /// Metric registration or encoding error.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Listen address could not be parsed.
    #[error("invalid listen address: {0}")]
    InvalidListenAddress(String),
}

impl ExporterError {
    /// Wrap an error with the startup step it happened in.
    pub fn at(step: StartupStep) -> impl FnOnce(ExporterError) -> ExporterError {
        move |source| ExporterError::Startup {
            step,
            source: Box::new(source),
        }
    }

    /// Check whether this error (or the error it wraps) is a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Startup { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

/// Convenience Result type for airquality-exporter operations.
pub type Result<T> = std::result::Result<T, ExporterError>;
