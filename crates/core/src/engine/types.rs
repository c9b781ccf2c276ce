//! Race engine types and trait.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stats::ColorSet;

/// Errors from the race engine command channel.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Command rejected: {0}")]
    Rejected(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Race status as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceStatus {
    Stopped,
    Formation,
    GreenFlag,
    Caution,
    Qualifying,
    #[default]
    Unknown,
}

impl RaceStatus {
    /// Map the engine's numeric status code.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Stopped,
            1 => Self::GreenFlag,
            2 => Self::Caution,
            3 => Self::Formation,
            -1 => Self::Qualifying,
            _ => Self::Unknown,
        }
    }

    /// Numeric code accepted by the engine's set-race command.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Stopped => Some(0),
            Self::GreenFlag => Some(1),
            Self::Caution => Some(2),
            Self::Formation => Some(3),
            Self::Qualifying => Some(-1),
            Self::Unknown => None,
        }
    }

    /// Formation, green flag or caution: cars are on a live race.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Formation | Self::GreenFlag | Self::Caution)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Formation => "Formation",
            Self::GreenFlag => "Green Flag",
            Self::Caution => "Caution",
            Self::Qualifying => "Qualifying",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for RaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A car to place into the simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub owner_id: String,
    pub name: String,
    pub body: String,
    pub colors: ColorSet,
}

/// Command channel into the race engine.
///
/// Accepted commands are reflected in later telemetry snapshots, not in the
/// call's return value.
#[async_trait]
pub trait RaceEngine: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Set the race status (start with green flag, stop with stopped).
    async fn set_race_status(&self, status: RaceStatus) -> Result<(), EngineError>;

    /// Remove every car from the session.
    async fn delete_all_participants(&self) -> Result<(), EngineError>;

    /// Spawn one car.
    async fn spawn_participant(&self, request: &SpawnRequest) -> Result<(), EngineError>;

    /// Remove one car by owner id.
    async fn remove_participant(&self, owner_id: &str) -> Result<(), EngineError>;

    /// Reset race control (laps, flags, timing) for the next race.
    async fn reset_control(&self) -> Result<(), EngineError>;
}
