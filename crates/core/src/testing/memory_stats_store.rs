//! In-memory stats store for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::stats::{ParticipantStats, StatsError, StatsStore};

/// StatsStore backed by a HashMap, with switchable load and save failures.
#[derive(Debug, Default)]
pub struct MemoryStatsStore {
    ledger: Mutex<HashMap<String, ParticipantStats>>,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
}

impl MemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the stored ledger.
    pub fn with_ledger(ledger: HashMap<String, ParticipantStats>) -> Self {
        Self {
            ledger: Mutex::new(ledger),
            ..Default::default()
        }
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// What is currently stored.
    pub fn snapshot(&self) -> HashMap<String, ParticipantStats> {
        self.ledger.lock().unwrap().clone()
    }
}

impl StatsStore for MemoryStatsStore {
    fn load(&self) -> Result<HashMap<String, ParticipantStats>, StatsError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StatsError::Database("simulated load failure".to_string()));
        }
        Ok(self.ledger.lock().unwrap().clone())
    }

    fn save(&self, ledger: &HashMap<String, ParticipantStats>) -> Result<(), StatsError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StatsError::Database("simulated save failure".to_string()));
        }
        *self.ledger.lock().unwrap() = ledger.clone();
        Ok(())
    }
}
