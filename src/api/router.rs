//! HTTP router and server.

use std::future::Future;
use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::{metrics, AppState};
use crate::error::ExporterError;

/// Default listen address: port 9999 on every interface.
pub const DEFAULT_LISTEN_ADDRESS: &str = ":9999";

/// Create the router serving `/metrics`.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address, `host:port` or `:port`.
    pub listen_address: String,
}

impl ServerConfig {
    pub fn new(listen_address: impl Into<String>) -> Self {
        Self {
            listen_address: listen_address.into(),
        }
    }

    /// Resolve the listen address to a socket address.
    ///
    /// An empty host (`:9999`) binds every IPv4 interface.
    pub fn bind_address(&self) -> crate::Result<SocketAddr> {
        let addr = &self.listen_address;
        let full = if addr.starts_with(':') {
            format!("0.0.0.0{}", addr)
        } else {
            addr.clone()
        };
        full.parse()
            .map_err(|_| ExporterError::InvalidListenAddress(addr.clone()))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LISTEN_ADDRESS)
    }
}

/// Start the metrics server and run until `shutdown` resolves.
pub async fn serve<F>(config: ServerConfig, state: AppState, shutdown: F) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.bind_address()?;
    let router = create_router(state);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(ExporterError::Io)?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ExporterError::Io)?;

    Ok(())
}
