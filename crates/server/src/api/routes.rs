use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{admin, handlers, middleware::metrics_middleware, race, telemetry, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health, config and state
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/status", get(handlers::get_status))
        .route("/overlay", get(handlers::get_overlay))
        // Entrants
        .route("/race/join", post(race::join))
        .route("/race/leave", post(race::leave))
        .route("/race/save-car", post(race::save_car))
        // Engine
        .route("/telemetry", post(telemetry::push_snapshot))
        // Operator overrides
        .route("/admin/entries/open", post(admin::open_entries))
        .route("/admin/entries/close", post(admin::close_entries))
        .route("/admin/race/start", post(admin::start_race))
        .route("/admin/race/reset", post(admin::reset_race))
        .route("/admin/predictions/toggle", post(admin::toggle_predictions))
        .route("/admin/predictions/refund", post(admin::refund_prediction))
        .route("/admin/best-laps/reset", post(admin::reset_best_laps))
        // Overlay stream
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
