//! Handler for incident submission.

use axum::{
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;

use super::{ApiError, ApiState};
use crate::{
    engine::{DispatchOutcome, fingerprint},
    models::IncidentEvent,
};

/// Response body of `POST /incidents`.
#[derive(Debug, Serialize, Clone)]
pub struct IncidentResponse {
    /// What the dispatcher did with the incident.
    pub outcome: &'static str,
    /// Fingerprint of the submitted incident.
    pub fingerprint: String,
    /// Extra context: the throttled scope or the matching filter rule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Pushes one incident through the dispatcher.
pub async fn submit_incident(
    State(state): State<ApiState>,
    payload: Result<Json<IncidentEvent>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(event) = payload?;
    let fingerprint = fingerprint(&event);

    let outcome = state.dispatcher.handle(event).await;
    let detail = match &outcome {
        DispatchOutcome::Disabled => return Err(ApiError::ServiceUnavailable),
        DispatchOutcome::Throttled(scope) => Some(scope.to_string()),
        DispatchOutcome::Ignored(rule) => Some(rule.clone()),
        _ => None,
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(IncidentResponse { outcome: outcome.kind(), fingerprint, detail }),
    ))
}
