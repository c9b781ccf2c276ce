//! Typed telemetry snapshot.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::RaceStatus;
use crate::stats::LapTime;

/// One car as reported by the engine's realtime list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantTelemetry {
    /// Stable owner identifier (the entrant id the car was spawned with).
    pub owner_id: String,
    pub name: String,
    pub place: u32,
    pub lap: u32,
    pub last_lap: Option<LapTime>,
    pub best_lap: Option<LapTime>,
    pub finished: bool,
}

/// One classified finisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishEntry {
    pub owner_id: String,
    pub name: String,
    /// Finishing place; `None` when the engine omitted it.
    pub place: Option<u32>,
    pub best_lap: Option<LapTime>,
}

/// A single observation of the race engine's world state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub status: RaceStatus,
    pub laps_remaining: i32,
    pub qualifying: bool,
    pub participants: Vec<ParticipantTelemetry>,
    pub finishers: Vec<FinishEntry>,
    pub received_at: DateTime<Utc>,
}

impl TelemetrySnapshot {
    /// Empty snapshot with the given status.
    pub fn empty(status: RaceStatus, received_at: DateTime<Utc>) -> Self {
        Self {
            status,
            laps_remaining: 0,
            qualifying: false,
            participants: Vec::new(),
            finishers: Vec::new(),
            received_at,
        }
    }

    /// Owner ids of every car currently on track.
    pub fn observed_ids(&self) -> HashSet<String> {
        self.participants
            .iter()
            .map(|p| p.owner_id.clone())
            .collect()
    }

    pub fn car_count(&self) -> usize {
        self.participants.len()
    }

    /// Finish order for this snapshot.
    ///
    /// Uses the engine's finish list when present, otherwise falls back to
    /// realtime entries flagged as finished.
    pub fn finish_list(&self) -> Vec<FinishEntry> {
        if !self.finishers.is_empty() {
            return self.finishers.clone();
        }
        self.participants
            .iter()
            .filter(|p| p.finished)
            .map(|p| FinishEntry {
                owner_id: p.owner_id.clone(),
                name: p.name.clone(),
                place: Some(p.place).filter(|place| *place > 0),
                best_lap: p.best_lap,
            })
            .collect()
    }

    /// Mean of the latest lap times with the two slowest discarded.
    pub fn typical_lap(&self) -> Option<LapTime> {
        let mut laps: Vec<u64> = self
            .participants
            .iter()
            .filter_map(|p| p.last_lap.map(|l| l.as_millis()))
            .collect();
        laps.sort_unstable();
        if laps.len() > 2 {
            laps.truncate(laps.len() - 2);
        }
        if laps.is_empty() {
            return None;
        }
        let total: u64 = laps.iter().sum();
        Some(LapTime::from_millis(total / laps.len() as u64))
    }
}
