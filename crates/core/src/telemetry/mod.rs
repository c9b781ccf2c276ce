//! Race engine telemetry.
//!
//! The engine periodically writes a JSON snapshot of its world state. This
//! module decodes that snapshot into a typed [`TelemetrySnapshot`] and can
//! poll the snapshot file for changes.

mod poller;
mod types;
pub mod wire;

pub use poller::TelemetryPoller;
pub use types::{FinishEntry, ParticipantTelemetry, TelemetrySnapshot};
pub use wire::{decode_snapshot, parse_snapshot, TelemetryError};
