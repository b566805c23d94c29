//! # airquality-exporter
//!
//! Prometheus exporter for SDS011 particulate matter sensors.
//!
//! The exporter opens the sensor on a serial port, puts it into a known
//! state (passive mode, configured cycle, active mode) and then publishes
//! every reading as the `airquality_pm{type="pm2.5"|"pm10"}` gauge on
//! `GET /metrics`.
//!
//! ## Features
//!
//! - **Bounded startup**: the passive-mode switch, which some firmware
//!   leaves unanswered, runs under a timeout with a small retry budget
//! - **Fail-soft measuring**: a bad read is logged and skipped, the
//!   endpoint keeps serving the last good values
//! - **Lightweight**: tokio, axum and the prometheus text encoder
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use airquality_exporter::{PmGauges, Sds011, SessionConfig, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> airquality_exporter::Result<()> {
//!     airquality_exporter::logging::try_init("info").ok();
//!
//!     let gauges = Arc::new(PmGauges::new()?);
//!     let manager = SessionManager::new(SessionConfig::new("/dev/ttyUSB0"), Sds011::open);
//!
//!     // Only returns on a fatal error
//!     let never = manager.run(gauges).await?;
//!     match never {}
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod sensor;
pub mod session;

// Re-export commonly used types
pub use error::{ExporterError, Result, StartupStep};
pub use metrics::PmGauges;
#[cfg(any(test, feature = "test-util"))]
pub use sensor::FakeSensor;
pub use sensor::{CancelFlag, Measurement, ReportingMode, Sds011, Sensor};
pub use session::{
    BoundedRetry, CycleAction, MeasurementLoop, Session, SessionConfig, SessionManager,
    SessionState,
};
