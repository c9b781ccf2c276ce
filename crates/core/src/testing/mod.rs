//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the race engine, the
//! prediction market and the stats store, so the orchestrator can be driven
//! end to end without a simulator or network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use pitwall_core::testing::{fixtures, MockRaceEngine, MockPredictionMarket};
//!
//! let engine = Arc::new(MockRaceEngine::new());
//! let market = Arc::new(MockPredictionMarket::new());
//!
//! // Feed snapshots into the orchestrator
//! orchestrator.tick(&fixtures::snapshot(RaceStatus::Stopped, &["u1"]), Utc::now()).await;
//!
//! // Assert on what reached the engine
//! assert_eq!(engine.spawn_calls().await.len(), 1);
//! ```

mod memory_stats_store;
mod mock_prediction_market;
mod mock_race_engine;

pub use memory_stats_store::MemoryStatsStore;
pub use mock_prediction_market::MockPredictionMarket;
pub use mock_race_engine::{EngineCall, MockRaceEngine};

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{DateTime, Utc};

    use crate::engine::RaceStatus;
    use crate::orchestrator::Entrant;
    use crate::stats::{ColorSet, LapTime};
    use crate::telemetry::{FinishEntry, ParticipantTelemetry, TelemetrySnapshot};

    /// Display name used for every fixture id.
    pub fn racer_name(id: &str) -> String {
        format!("Racer {}", id)
    }

    pub fn colors() -> ColorSet {
        [
            "#FF0000".to_string(),
            "#0000FF".to_string(),
            "#222222".to_string(),
        ]
    }

    /// A car on track at `place`, one lap in.
    pub fn participant(id: &str, place: u32) -> ParticipantTelemetry {
        ParticipantTelemetry {
            owner_id: id.to_string(),
            name: racer_name(id),
            place,
            lap: 1,
            last_lap: None,
            best_lap: None,
            finished: false,
        }
    }

    /// A snapshot with the given status and one car per id.
    pub fn snapshot(status: RaceStatus, ids: &[&str]) -> TelemetrySnapshot {
        let mut snapshot = TelemetrySnapshot::empty(status, Utc::now());
        snapshot.participants = ids
            .iter()
            .enumerate()
            .map(|(i, id)| participant(id, i as u32 + 1))
            .collect();
        snapshot
    }

    /// A green-flag snapshot with one car per id.
    pub fn racing_snapshot(ids: &[&str]) -> TelemetrySnapshot {
        snapshot(RaceStatus::GreenFlag, ids)
    }

    pub fn finish_entry(id: &str, place: u32) -> FinishEntry {
        FinishEntry {
            owner_id: id.to_string(),
            name: racer_name(id),
            place: Some(place),
            best_lap: None,
        }
    }

    /// A finisher with a best lap in milliseconds.
    pub fn finish_entry_with_lap(id: &str, place: u32, best_ms: u64) -> FinishEntry {
        FinishEntry {
            best_lap: Some(LapTime::from_millis(best_ms)),
            ..finish_entry(id, place)
        }
    }

    /// A human entrant with a fixed car.
    pub fn entrant(id: &str, joined_at: DateTime<Utc>) -> Entrant {
        Entrant {
            owner_id: id.to_string(),
            name: racer_name(id),
            body: "typea".to_string(),
            colors: colors(),
            is_bot: false,
            joined_at,
        }
    }
}
