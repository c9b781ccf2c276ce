use std::sync::Arc;

use tokio::sync::watch;

use pitwall_core::{Config, OrchestratorHandle, SanitizedConfig, TelemetrySnapshot};

use crate::api::WsBroadcaster;

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: OrchestratorHandle,
    /// Shared with the file poller; the orchestrator ticks on every publish.
    telemetry: Arc<watch::Sender<Option<TelemetrySnapshot>>>,
    ws_broadcaster: WsBroadcaster,
}

impl AppState {
    pub fn new(
        config: Config,
        orchestrator: OrchestratorHandle,
        telemetry: Arc<watch::Sender<Option<TelemetrySnapshot>>>,
        ws_broadcaster: WsBroadcaster,
    ) -> Self {
        Self {
            config,
            orchestrator,
            telemetry,
            ws_broadcaster,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn orchestrator(&self) -> &OrchestratorHandle {
        &self.orchestrator
    }

    pub fn telemetry(&self) -> &watch::Sender<Option<TelemetrySnapshot>> {
        &self.telemetry
    }

    pub fn ws_broadcaster(&self) -> &WsBroadcaster {
        &self.ws_broadcaster
    }
}
