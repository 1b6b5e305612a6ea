//! Represents the `/status` endpoint handler and response structure.
//! Provides application status and metrics.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;

use super::ApiState;
use crate::context::MetricsSnapshot;

/// Represents the response from the `/status` endpoint.
#[derive(Debug, Serialize, Clone)]
pub struct StatusResponse {
    /// The version of the application.
    pub version: String,
    /// The deployment environment.
    pub environment: String,
    /// Whether incidents are processed.
    pub enabled: bool,
    /// The uptime of the application in seconds.
    pub uptime_secs: u64,
    /// Deliveries currently in flight.
    pub in_flight_deliveries: usize,
    /// Incidents waiting in the open batch.
    pub pending_batch: usize,
    /// Pipeline counters.
    pub metrics: MetricsSnapshot,
}

/// Retrieves application status and metrics.
pub async fn status(State(state): State<ApiState>) -> impl IntoResponse {
    let response = StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.config.environment.clone(),
        enabled: state.dispatcher.is_enabled(),
        uptime_secs: state.app_metrics.start_time.elapsed().as_secs(),
        in_flight_deliveries: state.dispatcher.tracker().live_count(),
        pending_batch: state.dispatcher.pending_batch_len(),
        metrics: state.app_metrics.pipeline.snapshot(),
    };
    (StatusCode::OK, Json(response))
}
