//! HTTP surface of the exporter.
//!
//! ## Endpoints
//!
//! - `GET /metrics` - Prometheus text exposition of `airquality_pm`
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use airquality_exporter::api::{serve, AppState, ServerConfig};
//! use airquality_exporter::PmGauges;
//!
//! #[tokio::main]
//! async fn main() -> airquality_exporter::Result<()> {
//!     let state = AppState::new(Arc::new(PmGauges::new()?));
//!     serve(ServerConfig::new(":9999"), state, std::future::pending()).await
//! }
//! ```

pub mod handlers;
pub mod router;

pub use handlers::AppState;
pub use router::{create_router, serve, ServerConfig, DEFAULT_LISTEN_ADDRESS};
