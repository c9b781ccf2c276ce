//! Per-participant season statistics.
//!
//! The ledger is loaded from and saved to a [`StatsStore`] as a whole. Race
//! results are folded into it once per finished race by [`StatsLedger`].

mod ledger;
mod sqlite_store;
mod store;
mod types;

pub use ledger::{points_for_place, Placing, RaceResult, StatsLedger, TrackRecord, POINTS_TABLE};
pub use sqlite_store::SqliteStatsStore;
pub use store::{StatsError, StatsStore};
pub use types::{ColorSet, LapTime, LapTimeParseError, ParticipantStats};
