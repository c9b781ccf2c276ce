//! Race orchestrator implementation.
//!
//! One [`RaceOrchestrator`] owns the whole race cycle. Each telemetry snapshot
//! drives one [`tick`](RaceOrchestrator::tick):
//! 1. apply the snapshot to the session
//! 2. advance the phase machine (may queue commands)
//! 3. run at most one queued command
//! 4. reconcile the roster against the field
//!
//! Joins, leaves and admin actions arrive between ticks through the handle,
//! never concurrently with one.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::engine::RaceEngine;
use crate::metrics::{JOINS_TOTAL, PHASE_TRANSITIONS, QUEUE_DEPTH};
use crate::prediction::PredictionResolver;
use crate::stats::{ColorSet, StatsLedger};
use crate::telemetry::TelemetrySnapshot;

use super::commands::{reset_sequence, DeleteAllEntrants};
use super::config::OrchestratorConfig;
use super::overlay;
use super::queue::{CommandQueue, QueueEvent};
use super::reconciler::{ReconcileReport, RosterReconciler};
use super::session::RaceSession;
use super::types::{
    AdminAction, AdminResponse, Entrant, EntrantDescriptor, JoinDecision, OperatorAlert,
    OrchestratorError, OrchestratorStatus, OverlaySummary, RacePhase, SAVED_BODY,
};

/// Seconds shaved off the next-race estimate.
const NEXT_RACE_PADDING_SECS: i64 = 20;

/// What one tick did.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub phase: RacePhase,
    pub queue: QueueEvent,
    pub reconcile: ReconcileReport,
}

/// The race orchestrator - drives the entry, race and reset cycle.
pub struct RaceOrchestrator {
    pub(super) config: OrchestratorConfig,
    pub(super) session: RaceSession,
    pub(super) queue: CommandQueue<RaceSession>,
    reconciler: RosterReconciler,
    pub(super) ledger: StatsLedger,
    pub(super) predictions: PredictionResolver,
    rng: StdRng,
    alerts: VecDeque<OperatorAlert>,
    pub(super) last_winner: Option<String>,
    next_race_at: Option<DateTime<Utc>>,
}

impl RaceOrchestrator {
    /// Create a new orchestrator with entries open.
    pub fn new(
        config: OrchestratorConfig,
        engine: Arc<dyn RaceEngine>,
        ledger: StatsLedger,
        predictions: PredictionResolver,
    ) -> Self {
        let mut session = RaceSession::new(engine, config.command_timeout(), config.capacity);
        session.open_entries(config.entry_countdown_ticks);

        Self {
            queue: CommandQueue::new(config.max_command_attempts, config.max_command_restarts),
            reconciler: RosterReconciler::new(config.grace_period(), config.respawn_cooldown()),
            session,
            ledger,
            predictions,
            rng: StdRng::from_entropy(),
            alerts: VecDeque::new(),
            last_winner: None,
            next_race_at: None,
            config,
        }
    }

    /// Use a fixed random seed for bot names and liveries.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn phase(&self) -> RacePhase {
        self.session.phase
    }

    pub fn session(&self) -> &RaceSession {
        &self.session
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn ledger(&self) -> &StatsLedger {
        &self.ledger
    }

    pub fn predictions(&self) -> &PredictionResolver {
        &self.predictions
    }

    /// Names of queued commands, head first.
    pub fn queued_commands(&self) -> Vec<String> {
        self.queue.names()
    }

    pub fn alerts(&self) -> Vec<OperatorAlert> {
        self.alerts.iter().cloned().collect()
    }

    /// Process one telemetry snapshot.
    pub async fn tick(&mut self, snapshot: &TelemetrySnapshot, now: DateTime<Utc>) -> TickReport {
        if snapshot.laps_remaining != self.session.laps_remaining {
            self.estimate_next_race(snapshot, now);
        }
        self.session.apply_snapshot(snapshot);

        self.advance_phase(snapshot, now).await;

        let event = self.queue.run_one_tick(&mut self.session).await;
        self.record_queue_event(&event, now);
        if self.session.deleting && !self.queue.contains(DeleteAllEntrants::NAME) {
            // The delete was abandoned; do not leave reconciliation suspended.
            self.session.deleting = false;
        }
        QUEUE_DEPTH.set(self.queue.len() as i64);

        let observed = snapshot.observed_ids();
        let reconcile = self
            .reconciler
            .reconcile(&mut self.session, &observed, now)
            .await;

        TickReport {
            phase: self.session.phase,
            queue: event,
            reconcile,
        }
    }

    fn estimate_next_race(&mut self, snapshot: &TelemetrySnapshot, now: DateTime<Utc>) {
        let Some(lap) = snapshot.typical_lap() else {
            return;
        };
        let hold = self.config.seconds_from_ticks(self.config.finish_hold_ticks) as i64;
        self.next_race_at = Some(
            now + Duration::milliseconds(lap.as_millis() as i64)
                + Duration::seconds(hold - NEXT_RACE_PADDING_SECS),
        );
    }

    fn record_queue_event(&mut self, event: &QueueEvent, now: DateTime<Utc>) {
        if let QueueEvent::Abandoned { command, reason } = event {
            let message = OrchestratorError::CommandAbandoned {
                command: command.clone(),
                reason: reason.clone(),
            }
            .to_string();
            self.alerts.push_back(OperatorAlert {
                at: now,
                command: command.clone(),
                message,
            });
            while self.alerts.len() > self.config.alert_history {
                self.alerts.pop_front();
            }
        }
    }

    pub(super) fn transition(&mut self, to: RacePhase) {
        let from = self.session.phase;
        if from == to {
            return;
        }
        info!("Race phase {} -> {}", from, to);
        PHASE_TRANSITIONS
            .with_label_values(&[from.as_str(), to.as_str()])
            .inc();
        self.session.phase = to;

        match to {
            RacePhase::Filling => self.session.fill_ticks = 0,
            RacePhase::WaitingToStart => {
                self.session.start_countdown = if self.session.fast_start {
                    0
                } else {
                    self.config.start_countdown_ticks
                };
            }
            RacePhase::Finishing => {
                self.session.finish_countdown = self.config.finish_hold_ticks;
            }
            _ => {}
        }
    }

    /// Stop accepting joins and move on to filling.
    pub(super) fn close_entries(&mut self) {
        info!(
            "Entries closed with {}/{} entrants",
            self.session.roster.len(),
            self.config.capacity
        );
        self.session.entries_open = false;
        self.session.entry_countdown = 0;
        self.transition(RacePhase::Filling);
    }

    // =========================================================================
    // Roster
    // =========================================================================

    /// Accept or reject a join request.
    pub async fn on_join(&mut self, descriptor: EntrantDescriptor, now: DateTime<Utc>) -> JoinDecision {
        let decision = self.try_join(descriptor, now).await;
        let label = if decision.is_accepted() { "accepted" } else { "rejected" };
        JOINS_TOTAL.with_label_values(&[label]).inc();
        decision
    }

    async fn try_join(&mut self, descriptor: EntrantDescriptor, now: DateTime<Utc>) -> JoinDecision {
        let owner_id = descriptor.owner_id.trim().to_string();
        let name = descriptor.name.trim().to_string();
        if owner_id.is_empty() || name.is_empty() {
            return JoinDecision::Invalid;
        }
        if !self.session.phase.accepts_entries() || !self.session.entries_open {
            debug!("Join from {} rejected: entries closed", name);
            return JoinDecision::EntriesClosed;
        }
        if self.session.is_entered(&owner_id) {
            debug!("Join from {} rejected: already entered", name);
            return JoinDecision::AlreadyEntered;
        }
        if self.session.is_full() {
            return JoinDecision::RaceFull;
        }

        let (body, colors) = self.choose_car(&owner_id, &descriptor);
        let entrant = Entrant {
            owner_id,
            name,
            body,
            colors,
            is_bot: descriptor.is_bot,
            joined_at: now,
        };
        self.enroll(entrant, now).await;

        if self.session.is_full() {
            self.close_entries();
        }
        JoinDecision::Accepted
    }

    /// Add an entrant and send its spawn. A failed spawn is left to the
    /// reconciler once the cooldown passes.
    async fn enroll(&mut self, entrant: Entrant, now: DateTime<Utc>) {
        let request = entrant.spawn_request();
        let engine = self.session.engine.clone();
        if let Err(e) = self
            .session
            .call_engine("spawn_participant", engine.spawn_participant(&request))
            .await
        {
            warn!("Spawn for {} failed: {}", entrant.owner_id, e);
        }
        info!(
            "{} {} joined ({}, {}/{})",
            if entrant.is_bot { "Bot" } else { "Racer" },
            entrant.name,
            entrant.body,
            self.session.roster.len() + 1,
            self.config.capacity
        );
        self.session
            .pending_spawns
            .insert(entrant.owner_id.clone(), now);
        self.session.add_entrant(entrant);
    }

    fn choose_car(&mut self, owner_id: &str, descriptor: &EntrantDescriptor) -> (String, ColorSet) {
        if descriptor.wants_saved_car() {
            self.ledger.refresh();
            if let Some((body, colors)) = self.ledger.get(owner_id).and_then(|s| s.saved_car()) {
                debug!("Loading saved car for {}", owner_id);
                return (body.to_string(), colors.clone());
            }
        }
        let body = match descriptor.body.as_deref() {
            Some(body) if body != SAVED_BODY && !body.trim().is_empty() => body.to_string(),
            _ => self.random_body(),
        };
        let colors = match &descriptor.colors {
            Some(colors) => colors.clone(),
            None => self.random_colors(),
        };
        (body, colors)
    }

    fn random_body(&mut self) -> String {
        self.config
            .body_types
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_default()
    }

    /// Two distinct palette colors plus the accent.
    fn random_colors(&mut self) -> ColorSet {
        let first = self
            .config
            .colors
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_default();
        let others: Vec<&String> = self.config.colors.iter().filter(|c| **c != first).collect();
        let second = others
            .choose(&mut self.rng)
            .map(|c| (*c).clone())
            .unwrap_or_else(|| first.clone());
        [first, second, self.config.accent_color.clone()]
    }

    /// A bot whose name is not already on the roster.
    pub(super) fn next_bot(&mut self, now: DateTime<Utc>) -> Option<Entrant> {
        let available: Vec<String> = self
            .config
            .bot_names
            .iter()
            .filter(|name| !self.session.is_entered(&bot_id(name)))
            .cloned()
            .collect();
        let name = available.choose(&mut self.rng)?.clone();
        let body = self.random_body();
        let colors = self.random_colors();
        Some(Entrant {
            owner_id: bot_id(&name),
            name,
            body,
            colors,
            is_bot: true,
            joined_at: now,
        })
    }

    pub(super) async fn add_bot(&mut self, now: DateTime<Utc>) -> bool {
        let Some(bot) = self.next_bot(now) else {
            return false;
        };
        self.enroll(bot, now).await;
        JOINS_TOTAL.with_label_values(&["bot"]).inc();
        true
    }

    /// Remove an entrant. The engine is told first; the roster only changes
    /// when it accepts.
    pub async fn on_leave(&mut self, owner_id: &str) -> bool {
        if !self.session.phase.accepts_entries() {
            debug!("Leave from {} ignored during {}", owner_id, self.session.phase);
            return false;
        }
        if !self.session.is_entered(owner_id) {
            return false;
        }

        let engine = self.session.engine.clone();
        match self
            .session
            .call_engine("remove_participant", engine.remove_participant(owner_id))
            .await
        {
            Ok(()) => {
                self.session.remove_entrant(owner_id);
                info!(
                    "Removed {} ({} left on the roster)",
                    owner_id,
                    self.session.roster.len()
                );
                true
            }
            Err(e) => {
                warn!("Failed to remove {} from the engine: {}", owner_id, e);
                false
            }
        }
    }

    /// Store an entrant's car. Without an explicit car, the one they are
    /// currently entered with is saved.
    pub fn save_car(
        &mut self,
        owner_id: &str,
        name: &str,
        body: Option<String>,
        colors: Option<ColorSet>,
    ) -> bool {
        let car = match (body, colors) {
            (Some(body), Some(colors)) if body != SAVED_BODY => Some((body, colors)),
            _ => self
                .session
                .roster
                .iter()
                .find(|e| e.owner_id == owner_id)
                .or_else(|| {
                    self.session
                        .roster
                        .iter()
                        .find(|e| e.name.eq_ignore_ascii_case(name))
                })
                .map(|e| (e.body.clone(), e.colors.clone())),
        };
        let Some((body, colors)) = car else {
            warn!("No car to save for {}: not on the roster", name);
            return false;
        };
        self.ledger.save_car(owner_id, name, &body, &colors)
    }

    // =========================================================================
    // Administration
    // =========================================================================

    pub async fn admin(&mut self, action: AdminAction) -> AdminResponse {
        info!("Admin action: {:?}", action);
        match action {
            AdminAction::OpenEntries => self.manual_open(),
            AdminAction::CloseEntries => self.manual_close(),
            AdminAction::StartRace => self.manual_start(),
            AdminAction::ResetRace => self.manual_reset().await,
            AdminAction::TogglePredictions => {
                let enabled = self.predictions.toggle();
                AdminResponse::accepted(format!(
                    "@Admin predictions are now {}.",
                    if enabled { "ENABLED" } else { "DISABLED" }
                ))
            }
            AdminAction::RefundPrediction => {
                if self.predictions.cancel("manual refund").await {
                    AdminResponse::accepted("@Admin refunded the active prediction.")
                } else {
                    AdminResponse::rejected("@Admin, there is no active prediction to refund.")
                }
            }
            AdminAction::ResetBestLaps => {
                let cleared = self.ledger.reset_best_laps();
                AdminResponse::accepted(format!(
                    "@Admin cleared best laps for {} racer(s).",
                    cleared
                ))
            }
        }
    }

    /// Open entries again before the race has launched.
    pub fn manual_open(&mut self) -> AdminResponse {
        if self.session.entries_open {
            return AdminResponse::rejected("@Admin, entries are already open!");
        }
        if !self.session.phase.is_pre_race() || self.session.start_requested {
            return AdminResponse::rejected(format!(
                "@Admin, cannot open entries while {}.",
                self.session.phase
            ));
        }
        self.session.open_entries(self.config.entry_countdown_ticks);
        if self.session.roster.is_empty() {
            self.transition(RacePhase::EntriesOpen);
        } else {
            self.transition(RacePhase::CountdownToClose);
        }
        AdminResponse::accepted("@Admin manually OPENED entries. Join now with !join!")
    }

    pub fn manual_close(&mut self) -> AdminResponse {
        if !self.session.entries_open || !self.session.phase.accepts_entries() {
            return AdminResponse::rejected("@Admin, entries are already closed!");
        }
        self.close_entries();
        AdminResponse::accepted("@Admin manually CLOSED entries. Race start countdown begins!")
    }

    /// Skip the remaining timers and launch as soon as the field is ready.
    pub fn manual_start(&mut self) -> AdminResponse {
        if self.session.status.is_live() {
            return AdminResponse::rejected(format!(
                "@Admin, the race is already {}!",
                self.session.status
            ));
        }
        if self.session.start_requested || !self.session.phase.is_pre_race() {
            return AdminResponse::rejected("@Admin, the race sequence has already been started.");
        }
        if self.session.roster.len() < 2 && !self.config.auto_fill {
            return AdminResponse::rejected(
                "@Admin, you need at least 2 racers to start, and auto-fill is disabled!",
            );
        }

        self.session.fast_start = true;
        if self.session.entries_open {
            self.close_entries();
        }
        if self.config.auto_fill && !self.session.is_full() {
            self.transition(RacePhase::Filling);
            return AdminResponse::accepted(
                "@Admin manually started the fill process! Waiting for bots to spawn...",
            );
        }
        self.transition(RacePhase::WaitingToStart);
        self.session.start_countdown = 0;
        AdminResponse::accepted("@Admin force-starting race sequence. Launching next tick!")
    }

    /// Abort whatever is happening and run the full teardown.
    pub async fn manual_reset(&mut self) -> AdminResponse {
        let dropped = self.queue.clear();
        if dropped > 0 {
            warn!("Manual reset dropped {} queued command(s)", dropped);
        }
        self.begin_reset().await;
        AdminResponse::accepted(
            "@Admin manually issued a full race reset. New race cycle starting shortly.",
        )
    }

    /// Queue the teardown sequence and enter `Resetting`.
    pub(super) async fn begin_reset(&mut self) {
        for command in reset_sequence(self.config.entry_countdown_ticks) {
            self.queue.enqueue(command);
        }
        self.session.entries_open = false;
        self.transition(RacePhase::Resetting);
        self.clean_up_race().await;
    }

    /// Refund any open market and clear the roster, spawn tracking and race
    /// timers. Safe to repeat.
    pub(super) async fn clean_up_race(&mut self) {
        if self.predictions.cancel("race reset").await {
            info!("Open prediction refunded on reset");
        }
        self.session.clear_race();
    }

    // =========================================================================
    // Projections
    // =========================================================================

    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            phase: self.session.phase,
            race_status: self.session.status,
            entries_open: self.session.entries_open,
            capacity: self.config.capacity,
            roster: self.session.roster.clone(),
            observed_cars: self.session.observed_count(),
            pending_spawns: self.session.pending_spawns.len(),
            confirmed_spawns: self.session.confirmed_spawns.len(),
            queued_commands: self.queue.names(),
            predictions_enabled: self.predictions.enabled(),
            prediction: self.predictions.state().clone(),
            last_winner: self.last_winner.clone(),
            track_record: self.ledger.track_record().cloned(),
            alerts: self.alerts(),
        }
    }

    pub fn overlay_summary(&self) -> OverlaySummary {
        OverlaySummary {
            status: self.session.status.label().to_string(),
            phase: self.session.phase,
            roster_count: format!("{}/{}", self.session.roster.len(), self.config.capacity),
            entries_status: overlay::entries_status(&self.session),
            timer_text: overlay::timer_text(&self.config, &self.session),
            entrants: self.session.entrant_names(),
            ticker: overlay::ticker_lines(
                self.ledger.track_record(),
                self.last_winner.as_deref(),
                self.next_race_at,
                self.ledger.season_entrants(),
            ),
            prediction_active: self.predictions.is_active(),
            alerts: self.alerts(),
        }
    }
}

fn bot_id(name: &str) -> String {
    format!("UID_{}", name)
}
