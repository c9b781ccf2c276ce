//! Types for the race orchestrator.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{EngineError, RaceStatus, SpawnRequest};
use crate::prediction::PredictionState;
use crate::stats::{ColorSet, TrackRecord};

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Race engine call failed.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Engine accepted a command but never confirmed it.
    #[error("{0} timed out waiting for confirmation")]
    WaitTimeout(String),

    /// Retries and restarts exhausted.
    #[error("command {command} abandoned: {reason}")]
    CommandAbandoned { command: String, reason: String },

    /// The orchestrator task is gone.
    #[error("orchestrator is not running")]
    Stopped,
}

/// Discrete phase of the race cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RacePhase {
    /// Entries open, nobody has joined yet.
    #[default]
    EntriesOpen,
    /// Entries open and the entry timer is running.
    CountdownToClose,
    /// Entries closed; bots are being added.
    Filling,
    /// Short countdown before the start command.
    WaitingToStart,
    Racing,
    /// Results on screen.
    Finishing,
    /// Teardown commands draining.
    Resetting,
}

impl RacePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntriesOpen => "entries_open",
            Self::CountdownToClose => "countdown_to_close",
            Self::Filling => "filling",
            Self::WaitingToStart => "waiting_to_start",
            Self::Racing => "racing",
            Self::Finishing => "finishing",
            Self::Resetting => "resetting",
        }
    }

    /// Phases in which joins are accepted.
    pub fn accepts_entries(&self) -> bool {
        matches!(self, Self::EntriesOpen | Self::CountdownToClose)
    }

    /// Phases before the race has been launched.
    pub fn is_pre_race(&self) -> bool {
        matches!(
            self,
            Self::EntriesOpen | Self::CountdownToClose | Self::Filling | Self::WaitingToStart
        )
    }
}

impl fmt::Display for RacePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An accepted race participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entrant {
    pub owner_id: String,
    pub name: String,
    pub body: String,
    pub colors: ColorSet,
    pub is_bot: bool,
    pub joined_at: DateTime<Utc>,
}

impl Entrant {
    pub fn spawn_request(&self) -> SpawnRequest {
        SpawnRequest {
            owner_id: self.owner_id.clone(),
            name: self.name.clone(),
            body: self.body.clone(),
            colors: self.colors.clone(),
        }
    }
}

/// Body value that asks for the entrant's saved vehicle.
pub const SAVED_BODY: &str = "saved";

/// A join request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrantDescriptor {
    pub owner_id: String,
    pub name: String,
    /// Vehicle body, or `"saved"` for the stored configuration. Random when absent.
    #[serde(default)]
    pub body: Option<String>,
    /// Livery; random when absent.
    #[serde(default)]
    pub colors: Option<ColorSet>,
    #[serde(default)]
    pub is_bot: bool,
}

impl EntrantDescriptor {
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            name: name.into(),
            body: None,
            colors: None,
            is_bot: false,
        }
    }

    pub fn with_car(mut self, body: impl Into<String>, colors: ColorSet) -> Self {
        self.body = Some(body.into());
        self.colors = Some(colors);
        self
    }

    pub fn wants_saved_car(&self) -> bool {
        self.body.as_deref() == Some(SAVED_BODY)
    }
}

/// Result of a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinDecision {
    Accepted,
    EntriesClosed,
    AlreadyEntered,
    RaceFull,
    Invalid,
}

impl JoinDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::EntriesClosed => "entries_closed",
            Self::AlreadyEntered => "already_entered",
            Self::RaceFull => "race_full",
            Self::Invalid => "invalid",
        }
    }
}

/// Administrative overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    OpenEntries,
    CloseEntries,
    StartRace,
    ResetRace,
    TogglePredictions,
    RefundPrediction,
    ResetBestLaps,
}

/// Reply to an administrative action, phrased for chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminResponse {
    pub accepted: bool,
    pub message: String,
}

impl AdminResponse {
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            accepted: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            message: message.into(),
        }
    }
}

/// Something an operator needs to look at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorAlert {
    pub at: DateTime<Utc>,
    pub command: String,
    pub message: String,
}

/// Read-only projection for the broadcast overlay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlaySummary {
    pub status: String,
    pub phase: RacePhase,
    /// "entered/capacity".
    pub roster_count: String,
    pub entries_status: String,
    pub timer_text: String,
    pub entrants: Vec<String>,
    pub ticker: Vec<String>,
    pub prediction_active: bool,
    pub alerts: Vec<OperatorAlert>,
}

/// Detailed orchestrator state for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub phase: RacePhase,
    pub race_status: RaceStatus,
    pub entries_open: bool,
    pub capacity: usize,
    pub roster: Vec<Entrant>,
    pub observed_cars: usize,
    pub pending_spawns: usize,
    pub confirmed_spawns: usize,
    /// Names of queued commands, head first.
    pub queued_commands: Vec<String>,
    pub predictions_enabled: bool,
    pub prediction: PredictionState,
    pub last_winner: Option<String>,
    pub track_record: Option<TrackRecord>,
    pub alerts: Vec<OperatorAlert>,
}
