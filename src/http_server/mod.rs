//! HTTP server module: incident ingestion and status endpoints.

mod auth;
mod error;
mod incidents;
mod status;

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
pub use error::ApiError;
pub use incidents::IncidentResponse;
use serde_json::json;
pub use status::StatusResponse;
use tokio_util::sync::CancellationToken;

use crate::{config::AppConfig, context::AppMetrics, engine::Dispatcher};

/// State shared by all handlers.
#[derive(Clone)]
pub struct ApiState {
    /// Shared application configuration.
    pub config: Arc<AppConfig>,
    /// The dispatcher incidents are pushed into.
    pub dispatcher: Arc<Dispatcher>,
    /// Uptime and pipeline counters.
    pub app_metrics: AppMetrics,
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Builds the router. `POST /incidents` requires a bearer token when an API
/// key is configured.
pub fn router(state: ApiState) -> Router {
    let mut ingest: Router<ApiState> =
        Router::new().route("/incidents", post(incidents::submit_incident));
    if state.config.server.api_key.is_some() {
        ingest = ingest.route_layer(middleware::from_fn_with_state(state.clone(), auth::auth));
    }

    Router::new()
        .route("/health", get(health))
        .route("/status", get(status::status))
        .merge(ingest)
        .with_state(state)
}

/// Runs the HTTP server until `cancel` fires.
pub async fn run_server_from_config(
    state: ApiState,
    cancel: CancellationToken,
) -> Result<(), std::io::Error> {
    let addr: SocketAddr = state.config.server.listen_address.parse().map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Invalid server.listen_address: {e}"),
        )
    })?;

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "HTTP server listening.");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
}
