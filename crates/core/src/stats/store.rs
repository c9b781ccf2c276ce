//! Stats store trait and errors.

use std::collections::HashMap;

use thiserror::Error;

use super::ParticipantStats;

/// Errors from stats persistence.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt stats data: {0}")]
    Corrupt(String),
}

/// Whole-ledger persistence for participant statistics, keyed by owner id.
///
/// `save` must be atomic: after a failed save the previously stored ledger is
/// still what `load` returns.
pub trait StatsStore: Send + Sync {
    /// Load the full ledger.
    fn load(&self) -> Result<HashMap<String, ParticipantStats>, StatsError>;

    /// Replace the stored ledger entries with the given ones.
    fn save(&self, ledger: &HashMap<String, ParticipantStats>) -> Result<(), StatsError>;
}
