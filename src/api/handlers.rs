//! HTTP handlers.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::metrics::PmGauges;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub gauges: Arc<PmGauges>,
}

impl AppState {
    pub fn new(gauges: Arc<PmGauges>) -> Self {
        Self { gauges }
    }
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.gauges.encode_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, state.gauges.content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Cannot encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
