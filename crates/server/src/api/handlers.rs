use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use pitwall_core::{OrchestratorError, OrchestratorStatus, OverlaySummary, SanitizedConfig};

use crate::metrics::encode_metrics;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Error response shared by every handler.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

/// Map an orchestrator failure to a response.
pub fn orchestrator_error(err: OrchestratorError) -> ApiError {
    match err {
        OrchestratorError::Stopped => api_error(StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        other => api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// Full orchestrator state, served from the orchestrator task.
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<OrchestratorStatus>, ApiError> {
    state
        .orchestrator()
        .status()
        .await
        .map(Json)
        .map_err(orchestrator_error)
}

/// Latest overlay projection. Never blocks on the orchestrator task.
pub async fn get_overlay(State(state): State<Arc<AppState>>) -> Json<OverlaySummary> {
    Json(state.orchestrator().overlay())
}

pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
