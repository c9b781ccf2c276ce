//! Task wrapper around [`RaceOrchestrator`].
//!
//! The orchestrator is owned by a single task. Telemetry ticks and requests
//! from the handle are handled one at a time, so a join never lands in the
//! middle of a tick.

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::stats::ColorSet;
use crate::telemetry::TelemetrySnapshot;

use super::runner::RaceOrchestrator;
use super::types::{
    AdminAction, AdminResponse, EntrantDescriptor, JoinDecision, OrchestratorError,
    OrchestratorStatus, OverlaySummary,
};

const REQUEST_BUFFER: usize = 64;

/// A request sent to the orchestrator task.
#[derive(Debug)]
pub enum OrchestratorRequest {
    Join {
        descriptor: EntrantDescriptor,
        reply: oneshot::Sender<JoinDecision>,
    },
    Leave {
        owner_id: String,
        reply: oneshot::Sender<bool>,
    },
    SaveCar {
        owner_id: String,
        name: String,
        body: Option<String>,
        colors: Option<ColorSet>,
        reply: oneshot::Sender<bool>,
    },
    Admin {
        action: AdminAction,
        reply: oneshot::Sender<AdminResponse>,
    },
    Status {
        reply: oneshot::Sender<OrchestratorStatus>,
    },
}

/// Handle for talking to a running orchestrator.
///
/// Cheap to clone. Every call fails with [`OrchestratorError::Stopped`] once
/// the task has exited.
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<OrchestratorRequest>,
    overlay: watch::Receiver<OverlaySummary>,
}

impl OrchestratorHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> OrchestratorRequest,
    ) -> Result<T, OrchestratorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| OrchestratorError::Stopped)?;
        rx.await.map_err(|_| OrchestratorError::Stopped)
    }

    pub async fn join(&self, descriptor: EntrantDescriptor) -> Result<JoinDecision, OrchestratorError> {
        self.request(|reply| OrchestratorRequest::Join { descriptor, reply })
            .await
    }

    pub async fn leave(&self, owner_id: impl Into<String>) -> Result<bool, OrchestratorError> {
        let owner_id = owner_id.into();
        self.request(|reply| OrchestratorRequest::Leave { owner_id, reply })
            .await
    }

    pub async fn save_car(
        &self,
        owner_id: impl Into<String>,
        name: impl Into<String>,
        body: Option<String>,
        colors: Option<ColorSet>,
    ) -> Result<bool, OrchestratorError> {
        let owner_id = owner_id.into();
        let name = name.into();
        self.request(|reply| OrchestratorRequest::SaveCar {
            owner_id,
            name,
            body,
            colors,
            reply,
        })
        .await
    }

    pub async fn admin(&self, action: AdminAction) -> Result<AdminResponse, OrchestratorError> {
        self.request(|reply| OrchestratorRequest::Admin { action, reply })
            .await
    }

    pub async fn status(&self) -> Result<OrchestratorStatus, OrchestratorError> {
        self.request(|reply| OrchestratorRequest::Status { reply })
            .await
    }

    /// Latest published overlay.
    pub fn overlay(&self) -> OverlaySummary {
        self.overlay.borrow().clone()
    }

    pub fn subscribe_overlay(&self) -> watch::Receiver<OverlaySummary> {
        self.overlay.clone()
    }
}

/// Spawn the orchestrator task.
///
/// The task ticks once per new telemetry snapshot and serves handle requests
/// in between. It exits on shutdown, or once both the telemetry sender and
/// every handle are gone.
pub fn spawn_orchestrator(
    orchestrator: RaceOrchestrator,
    telemetry: watch::Receiver<Option<TelemetrySnapshot>>,
    shutdown: broadcast::Receiver<()>,
) -> (OrchestratorHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(REQUEST_BUFFER);
    let (overlay_tx, overlay_rx) = watch::channel(orchestrator.overlay_summary());
    let handle = OrchestratorHandle {
        tx,
        overlay: overlay_rx,
    };
    let task = tokio::spawn(run(orchestrator, rx, telemetry, overlay_tx, shutdown));
    (handle, task)
}

async fn run(
    mut orchestrator: RaceOrchestrator,
    mut requests: mpsc::Receiver<OrchestratorRequest>,
    mut telemetry: watch::Receiver<Option<TelemetrySnapshot>>,
    overlay: watch::Sender<OverlaySummary>,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!(
        "Race orchestrator started (capacity {}, phase {})",
        orchestrator.config().capacity,
        orchestrator.phase()
    );
    let mut telemetry_open = true;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("Race orchestrator shutting down");
                break;
            }
            Some(request) = requests.recv() => {
                handle_request(&mut orchestrator, request).await;
            }
            changed = telemetry.changed(), if telemetry_open => {
                if changed.is_err() {
                    debug!("Telemetry source closed");
                    telemetry_open = false;
                    continue;
                }
                let snapshot = telemetry.borrow_and_update().clone();
                if let Some(snapshot) = snapshot {
                    orchestrator.tick(&snapshot, Utc::now()).await;
                }
            }
            else => break,
        }
        overlay.send_replace(orchestrator.overlay_summary());
    }
}

async fn handle_request(orchestrator: &mut RaceOrchestrator, request: OrchestratorRequest) {
    // A dropped reply receiver just means the caller gave up.
    match request {
        OrchestratorRequest::Join { descriptor, reply } => {
            let decision = orchestrator.on_join(descriptor, Utc::now()).await;
            let _ = reply.send(decision);
        }
        OrchestratorRequest::Leave { owner_id, reply } => {
            let removed = orchestrator.on_leave(&owner_id).await;
            let _ = reply.send(removed);
        }
        OrchestratorRequest::SaveCar {
            owner_id,
            name,
            body,
            colors,
            reply,
        } => {
            let saved = orchestrator.save_car(&owner_id, &name, body, colors);
            let _ = reply.send(saved);
        }
        OrchestratorRequest::Admin { action, reply } => {
            let response = orchestrator.admin(action).await;
            let _ = reply.send(response);
        }
        OrchestratorRequest::Status { reply } => {
            let _ = reply.send(orchestrator.status());
        }
    }
}
