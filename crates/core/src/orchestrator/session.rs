//! Shared state for one race cycle.
//!
//! The phase machine, the command queue, and the reconciler all operate on a
//! single [`RaceSession`], one after another inside a tick.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::engine::{EngineError, RaceEngine, RaceStatus};
use crate::metrics::{ENGINE_CALL_DURATION, ROSTER_SIZE};
use crate::telemetry::TelemetrySnapshot;

use super::types::{Entrant, RacePhase};

pub struct RaceSession {
    pub(crate) engine: Arc<dyn RaceEngine>,
    call_timeout: Duration,

    pub phase: RacePhase,
    /// Accepted entrants in join order.
    pub roster: Vec<Entrant>,
    pub capacity: usize,
    /// Entrant id -> last spawn command sent.
    pub pending_spawns: HashMap<String, DateTime<Utc>>,
    /// Entrant id -> last time seen in telemetry.
    pub confirmed_spawns: HashMap<String, DateTime<Utc>>,

    // Latest telemetry
    pub status: RaceStatus,
    pub laps_remaining: i32,
    pub qualifying: bool,
    pub observed_ids: HashSet<String>,

    pub entries_open: bool,
    /// Bulk delete in flight; reconciliation is suspended.
    pub deleting: bool,
    /// The start command has been queued for this cycle.
    pub start_requested: bool,
    /// Skip the start countdown once filling ends.
    pub fast_start: bool,
    /// The finish of this race has been recorded.
    pub finish_handled: bool,

    pub entry_countdown: u32,
    pub start_countdown: u32,
    pub finish_countdown: u32,
    pub fill_ticks: u32,
}

impl RaceSession {
    pub fn new(engine: Arc<dyn RaceEngine>, call_timeout: Duration, capacity: usize) -> Self {
        Self {
            engine,
            call_timeout,
            phase: RacePhase::EntriesOpen,
            roster: Vec::new(),
            capacity,
            pending_spawns: HashMap::new(),
            confirmed_spawns: HashMap::new(),
            status: RaceStatus::Unknown,
            laps_remaining: 0,
            qualifying: false,
            observed_ids: HashSet::new(),
            entries_open: true,
            deleting: false,
            start_requested: false,
            fast_start: false,
            finish_handled: false,
            entry_countdown: 0,
            start_countdown: 0,
            finish_countdown: 0,
            fill_ticks: 0,
        }
    }

    /// Copy the parts of a snapshot the tick works from.
    pub fn apply_snapshot(&mut self, snapshot: &TelemetrySnapshot) {
        self.status = snapshot.status;
        self.laps_remaining = snapshot.laps_remaining;
        self.qualifying = snapshot.qualifying;
        self.observed_ids = snapshot.observed_ids();
    }

    pub fn observed_count(&self) -> usize {
        self.observed_ids.len()
    }

    pub fn is_entered(&self, owner_id: &str) -> bool {
        self.roster.iter().any(|e| e.owner_id == owner_id)
    }

    pub fn is_full(&self) -> bool {
        self.roster.len() >= self.capacity
    }

    pub fn slots_left(&self) -> usize {
        self.capacity.saturating_sub(self.roster.len())
    }

    pub fn entrant_names(&self) -> Vec<String> {
        self.roster.iter().map(|e| e.name.clone()).collect()
    }

    pub fn add_entrant(&mut self, entrant: Entrant) {
        self.roster.push(entrant);
        ROSTER_SIZE.set(self.roster.len() as i64);
    }

    pub fn remove_entrant(&mut self, owner_id: &str) -> Option<Entrant> {
        let idx = self.roster.iter().position(|e| e.owner_id == owner_id)?;
        let entrant = self.roster.remove(idx);
        self.pending_spawns.remove(owner_id);
        self.confirmed_spawns.remove(owner_id);
        ROSTER_SIZE.set(self.roster.len() as i64);
        Some(entrant)
    }

    /// Open entries with a full entry timer.
    pub fn open_entries(&mut self, countdown_ticks: u32) {
        self.entries_open = true;
        self.entry_countdown = countdown_ticks;
        self.start_requested = false;
        self.fast_start = false;
    }

    /// Forget everything about the current race. The entry timer belongs to
    /// the next race and is left alone.
    pub fn clear_race(&mut self) {
        self.roster.clear();
        self.pending_spawns.clear();
        self.confirmed_spawns.clear();
        self.start_requested = false;
        self.fast_start = false;
        self.finish_handled = false;
        self.start_countdown = 0;
        self.finish_countdown = 0;
        self.fill_ticks = 0;
        ROSTER_SIZE.set(0);
    }

    /// Run an engine call under the session's timeout. A call that does not
    /// return in time is reported as [`EngineError::Timeout`].
    pub async fn call_engine<F>(&self, call: &str, fut: F) -> Result<(), EngineError>
    where
        F: Future<Output = Result<(), EngineError>>,
    {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout),
        };
        let label = if result.is_ok() { "ok" } else { "error" };
        ENGINE_CALL_DURATION
            .with_label_values(&[call, label])
            .observe(started.elapsed().as_secs_f64());
        result
    }
}
