//! Sensor session lifecycle.
//!
//! Startup and steady state use two separate failure policies:
//! [`BoundedRetry`] fails fast once its small budget is spent, while
//! [`MeasurementLoop`] retries reads forever and never gives up.

mod config;
mod manager;
mod measure;
mod retry;
mod state;

pub use config::{SessionConfig, DEFAULT_CYCLE, DEFAULT_PORT_PATH};
pub use manager::{CycleAction, Session, SessionManager};
pub use measure::MeasurementLoop;
pub use retry::{BoundedRetry, DEFAULT_BACKOFF_UNIT, DEFAULT_CALL_TIMEOUT, DEFAULT_RETRIES};
pub use state::SessionState;
