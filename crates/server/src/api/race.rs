//! Entrant-facing race handlers (join, leave, save car).

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use pitwall_core::{ColorSet, EntrantDescriptor, JoinDecision};

use super::handlers::{api_error, orchestrator_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub decision: JoinDecision,
    pub owner_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LeaveBody {
    pub owner_id: String,
}

#[derive(Debug, Serialize)]
pub struct LeaveResponse {
    pub owner_id: String,
    pub removed: bool,
}

#[derive(Debug, Deserialize)]
pub struct SaveCarBody {
    pub owner_id: String,
    pub name: String,
    /// Defaults to the body the entrant is currently racing.
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub colors: Option<ColorSet>,
}

#[derive(Debug, Serialize)]
pub struct SaveCarResponse {
    pub owner_id: String,
    pub saved: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Ask to join the current race.
///
/// Returns 403 with the decision when the join is refused.
pub async fn join(
    State(state): State<Arc<AppState>>,
    Json(descriptor): Json<EntrantDescriptor>,
) -> Result<Json<JoinResponse>, ApiError> {
    let owner_id = descriptor.owner_id.clone();
    let decision = state
        .orchestrator()
        .join(descriptor)
        .await
        .map_err(orchestrator_error)?;

    if !decision.is_accepted() {
        debug!("Join refused for {}: {}", owner_id, decision.as_str());
        return Err(api_error(StatusCode::FORBIDDEN, decision.as_str()));
    }

    Ok(Json(JoinResponse { decision, owner_id }))
}

/// Withdraw from the current race. Only allowed before entries close.
pub async fn leave(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LeaveBody>,
) -> Result<Json<LeaveResponse>, ApiError> {
    let removed = state
        .orchestrator()
        .leave(body.owner_id.clone())
        .await
        .map_err(orchestrator_error)?;

    if !removed {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            format!("{} cannot leave right now", body.owner_id),
        ));
    }

    Ok(Json(LeaveResponse {
        owner_id: body.owner_id,
        removed,
    }))
}

/// Store a vehicle configuration for later `"saved"` joins.
pub async fn save_car(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SaveCarBody>,
) -> Result<Json<SaveCarResponse>, ApiError> {
    let saved = state
        .orchestrator()
        .save_car(body.owner_id.clone(), body.name, body.body, body.colors)
        .await
        .map_err(orchestrator_error)?;

    if !saved {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("no car to save for {}", body.owner_id),
        ));
    }

    Ok(Json(SaveCarResponse {
        owner_id: body.owner_id,
        saved,
    }))
}
