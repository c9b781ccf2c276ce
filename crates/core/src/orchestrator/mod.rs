//! Race lifecycle orchestrator.
//!
//! Drives the broadcast's race cycle from telemetry:
//! - **Phases**: entries, fill, start, race, results, reset
//! - **Commands**: engine actions that need confirmation run through a
//!   sequential queue with retries, restarts and abandonment
//! - **Roster**: entrants missing from the field are respawned

mod commands;
mod config;
mod handle;
mod overlay;
mod phase;
mod queue;
mod reconciler;
mod runner;
mod session;
mod types;

pub use commands::{
    reset_sequence, ConfirmRaceStart, ConfirmRaceStop, DeleteAllEntrants, ReopenEntries,
    ResetRaceControl, SessionCommand,
};
pub use config::OrchestratorConfig;
pub use handle::{spawn_orchestrator, OrchestratorHandle, OrchestratorRequest};
pub use queue::{CommandOutcome, CommandQueue, QueueEvent, QueuedCommand};
pub use reconciler::{ReconcileReport, RosterReconciler};
pub use runner::{RaceOrchestrator, TickReport};
pub use session::RaceSession;
pub use types::*;
