//! Operator overrides.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use pitwall_core::{AdminAction, AdminResponse};

use super::handlers::{orchestrator_error, ApiError};
use crate::state::AppState;

/// Run an admin action. Rejected actions come back as 409 with the same body.
async fn run_action(
    state: &AppState,
    action: AdminAction,
) -> Result<(StatusCode, Json<AdminResponse>), ApiError> {
    let response = state
        .orchestrator()
        .admin(action)
        .await
        .map_err(orchestrator_error)?;
    let status = if response.accepted {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    };
    Ok((status, Json(response)))
}

pub async fn open_entries(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<AdminResponse>), ApiError> {
    run_action(&state, AdminAction::OpenEntries).await
}

pub async fn close_entries(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<AdminResponse>), ApiError> {
    run_action(&state, AdminAction::CloseEntries).await
}

/// Skip the remaining entry/fill wait and start as soon as possible.
pub async fn start_race(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<AdminResponse>), ApiError> {
    run_action(&state, AdminAction::StartRace).await
}

pub async fn reset_race(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<AdminResponse>), ApiError> {
    run_action(&state, AdminAction::ResetRace).await
}

pub async fn toggle_predictions(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<AdminResponse>), ApiError> {
    run_action(&state, AdminAction::TogglePredictions).await
}

pub async fn refund_prediction(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<AdminResponse>), ApiError> {
    run_action(&state, AdminAction::RefundPrediction).await
}

pub async fn reset_best_laps(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<AdminResponse>), ApiError> {
    run_action(&state, AdminAction::ResetBestLaps).await
}
