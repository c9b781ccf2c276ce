//! Telemetry push endpoint.
//!
//! The engine (or a relay) can POST its snapshot instead of writing the
//! snapshot file. Pushed snapshots go through the same channel as polled
//! ones.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use pitwall_core::telemetry::decode_snapshot;

use super::handlers::{api_error, ApiError};
use crate::metrics::TELEMETRY_PUSHES;
use crate::state::AppState;

pub async fn push_snapshot(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<Value>,
) -> Result<StatusCode, ApiError> {
    match decode_snapshot(raw, Utc::now()) {
        Ok(snapshot) => {
            debug!(
                "Telemetry pushed: status {:?}, {} cars",
                snapshot.status,
                snapshot.car_count()
            );
            state.telemetry().send_replace(Some(snapshot));
            TELEMETRY_PUSHES.with_label_values(&["accepted"]).inc();
            Ok(StatusCode::ACCEPTED)
        }
        Err(e) => {
            warn!("Rejected telemetry push: {}", e);
            TELEMETRY_PUSHES.with_label_values(&["rejected"]).inc();
            Err(api_error(StatusCode::BAD_REQUEST, e.to_string()))
        }
    }
}
