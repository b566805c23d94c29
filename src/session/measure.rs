//! Steady-state measurement loop.
//!
//! Unlike startup, reads here are never fatal. A failed read is logged and
//! the next read starts right away, so `/metrics` keeps serving the last
//! good values for as long as the process lives.

use std::convert::Infallible;
use std::sync::Arc;

use tracing::{error, info};

use crate::metrics::PmGauges;
use crate::sensor::{Measurement, Sensor};

/// Reads measurements from an active sensor and publishes them.
pub struct MeasurementLoop<S: Sensor> {
    sensor: S,
    gauges: Arc<PmGauges>,
}

impl<S: Sensor> MeasurementLoop<S> {
    pub fn new(sensor: S, gauges: Arc<PmGauges>) -> Self {
        Self { sensor, gauges }
    }

    /// Perform one blocking read.
    ///
    /// Returns the measurement if one was published.
    pub fn step(&mut self) -> Option<Measurement> {
        match self.sensor.read_measurement() {
            Ok(measurement) => {
                info!("Sensor measurement results: {}", measurement);
                self.gauges.publish(&measurement);
                Some(measurement)
            }
            Err(e) => {
                error!("Getting sensor measurement error: {}", e);
                None
            }
        }
    }

    /// Read forever.
    pub fn run(mut self) -> Infallible {
        loop {
            self.step();
        }
    }
}
