//! Sensor handle abstraction.
//!
//! The session manager talks to the particulate matter sensor only through
//! the [`Sensor`] trait. [`Sds011`] drives a real device over a serial port,
//! `FakeSensor` (feature `test-util`) is a scripted stand-in used by tests.
//!
//! Every method is blocking. Callers that live on the async runtime must
//! move the handle into a blocking task first.

#[cfg(any(test, feature = "test-util"))]
pub mod fake;
mod sds011;

#[cfg(any(test, feature = "test-util"))]
pub use fake::{FakeEntry, FakeSensor};
pub use sds011::{Sds011, SerialLink};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::Result;

/// Label value used for the PM2.5 gauge.
pub const PM25_LABEL: &str = "pm2.5";

/// Label value used for the PM10 gauge.
pub const PM10_LABEL: &str = "pm10";

/// Largest cycle length the sensor accepts, in minutes.
pub const MAX_CYCLE_MINUTES: u8 = 30;

/// Data reporting mode of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportingMode {
    /// The sensor reports a measurement once per cycle on its own.
    Active,
    /// Measurements are only produced on request.
    Passive,
}

/// One particulate matter reading, in µg/m³.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// PM2.5 concentration.
    pub pm25: f64,
    /// PM10 concentration.
    pub pm10: f64,
}

impl Measurement {
    /// Create a new measurement.
    pub fn new(pm25: f64, pm10: f64) -> Self {
        Self { pm25, pm10 }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PM2.5: {:.1} µg/m³, PM10: {:.1} µg/m³", self.pm25, self.pm10)
    }
}

/// Flag telling a device call that its caller stopped waiting.
///
/// Handles check it between reads and give up with
/// [`ExporterError::Cancelled`](crate::ExporterError::Cancelled), so an
/// abandoned call stops touching the port.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Blocking session with one particulate matter sensor.
///
/// Opening happens in the implementation's constructor and closing happens
/// on drop.
pub trait Sensor: Send + Sized + 'static {
    /// Open a second handle onto the same device.
    ///
    /// Used to hand an owned handle to a call that may be abandoned.
    fn try_clone(&self) -> Result<Self>;

    /// Make this handle give up its current and future calls once `cancel`
    /// is set.
    fn set_cancel_flag(&mut self, cancel: CancelFlag);

    /// Switch the data reporting mode.
    fn set_mode(&mut self, mode: ReportingMode) -> Result<()>;

    /// Read the configured cycle length in minutes.
    fn cycle(&mut self) -> Result<u8>;

    /// Set the cycle length in minutes (0 means continuous).
    fn set_cycle(&mut self, minutes: u8) -> Result<()>;

    /// Block until the next measurement arrives.
    fn read_measurement(&mut self) -> Result<Measurement>;
}
