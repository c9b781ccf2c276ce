//! Phase state machine.
//!
//! ```text
//! EntriesOpen -> CountdownToClose -> Filling -> WaitingToStart -> Racing
//!      ^                                                            |
//!      +------------- Resetting <------------- Finishing <----------+
//! ```
//!
//! A race the engine reports as started while the cycle is still before
//! launch jumps straight to `Racing`. An `Unknown` status never moves the
//! phase by itself.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::engine::RaceStatus;
use crate::metrics::RACES_COMPLETED;
use crate::telemetry::TelemetrySnapshot;

use super::commands::ConfirmRaceStart;
use super::runner::RaceOrchestrator;
use super::types::RacePhase;

impl RaceOrchestrator {
    pub(super) async fn advance_phase(&mut self, snapshot: &TelemetrySnapshot, now: DateTime<Utc>) {
        if self.started_externally() {
            info!("Race went green without a start command, following it");
            self.session.entries_open = false;
            self.session.entry_countdown = 0;
            self.session.start_requested = true;
            self.open_prediction().await;
            self.transition(RacePhase::Racing);
            return;
        }

        match self.session.phase {
            RacePhase::EntriesOpen => {
                if !self.session.roster.is_empty() {
                    self.transition(RacePhase::CountdownToClose);
                }
            }
            RacePhase::CountdownToClose => self.entry_tick(),
            RacePhase::Filling => self.fill_tick(now).await,
            RacePhase::WaitingToStart => self.start_tick().await,
            RacePhase::Racing => self.race_tick(snapshot).await,
            RacePhase::Finishing => self.finish_tick().await,
            RacePhase::Resetting => self.reset_tick().await,
        }
    }

    fn started_externally(&self) -> bool {
        self.session.phase.is_pre_race()
            && self.session.status == RaceStatus::GreenFlag
            && !self.session.start_requested
            && !self.session.roster.is_empty()
    }

    fn entry_tick(&mut self) {
        if self.session.roster.is_empty() {
            self.transition(RacePhase::EntriesOpen);
            return;
        }
        if self.session.is_full() {
            self.close_entries();
            return;
        }
        self.session.entry_countdown = self.session.entry_countdown.saturating_sub(1);
        if self.session.entry_countdown % 40 == 0 {
            debug!("Entries close in {} ticks", self.session.entry_countdown);
        }
        if self.session.entry_countdown == 0 {
            self.close_entries();
        }
    }

    /// One bot per tick until the grid is full, then wait for the field to
    /// show up in telemetry (bounded by the fill timeout).
    async fn fill_tick(&mut self, now: DateTime<Utc>) {
        self.session.fill_ticks += 1;

        if self.config.auto_fill && !self.session.is_full() && self.add_bot(now).await {
            return;
        }

        let entered = self.session.roster.len();
        if entered < self.config.min_entrants {
            info!(
                "Only {} entrant(s), need {}; reopening entries",
                entered, self.config.min_entrants
            );
            self.session.open_entries(self.config.entry_countdown_ticks);
            let next = if entered == 0 {
                RacePhase::EntriesOpen
            } else {
                RacePhase::CountdownToClose
            };
            self.transition(next);
            return;
        }

        let on_track = self.session.observed_count() >= entered;
        let timed_out = self.session.fill_ticks >= self.config.fill_timeout_ticks;
        if !self.config.auto_fill || on_track || timed_out {
            if timed_out && !on_track {
                warn!(
                    "Fill timed out with {}/{} cars on track",
                    self.session.observed_count(),
                    entered
                );
            }
            self.transition(RacePhase::WaitingToStart);
        }
    }

    async fn start_tick(&mut self) {
        if !self.session.start_requested {
            self.session.start_countdown = self.session.start_countdown.saturating_sub(1);
            if self.session.start_countdown == 0 {
                self.launch().await;
            }
            return;
        }

        if self.session.status.is_live() {
            self.transition(RacePhase::Racing);
        } else if !self.queue.contains(ConfirmRaceStart::NAME) {
            warn!("Start command gave up before the race went live; relaunching");
            self.session.start_requested = false;
            self.session.start_countdown = self.config.start_countdown_ticks;
        }
    }

    async fn launch(&mut self) {
        info!(
            "Launching race with {} entrant(s)",
            self.session.roster.len()
        );
        self.session.start_requested = true;
        self.queue.enqueue(ConfirmRaceStart::boxed());
        self.open_prediction().await;
    }

    async fn open_prediction(&mut self) {
        let names = self.session.entrant_names();
        if names.len() < 2 {
            debug!("Not enough entrants for a prediction ({})", names.len());
            return;
        }
        self.predictions.open(&names).await;
    }

    async fn race_tick(&mut self, snapshot: &TelemetrySnapshot) {
        if self.session.finish_handled {
            return;
        }
        let finishers = snapshot.finish_list();
        // A fill timeout can launch with cars that never reached the track.
        let expected = self
            .session
            .roster
            .iter()
            .filter(|e| {
                self.session.observed_ids.contains(&e.owner_id)
                    || finishers.iter().any(|f| f.owner_id == e.owner_id)
            })
            .count();
        if expected == 0 || finishers.len() < expected {
            return;
        }

        self.session.finish_handled = true;
        let result = self.ledger.record_race(&finishers);
        RACES_COMPLETED.inc();
        info!(
            "Race finished: winner {}, {} classified",
            result.winner.as_deref().unwrap_or("none"),
            result.placings.len()
        );
        if let Some(record) = result.fastest_lap.as_ref().filter(|_| result.new_record) {
            info!("New track record {} by {}", record.lap, record.holder);
        }
        self.last_winner = result.winner.clone();

        let resolution = self.predictions.resolve(result.winner.as_deref()).await;
        debug!("Prediction resolution: {:?}", resolution);

        self.transition(RacePhase::Finishing);
    }

    async fn finish_tick(&mut self) {
        self.session.finish_countdown = self.session.finish_countdown.saturating_sub(1);
        if self.session.finish_countdown == 0 {
            self.begin_reset().await;
        }
    }

    /// Keep the slate clean until the teardown commands drain, then reopen.
    async fn reset_tick(&mut self) {
        self.clean_up_race().await;
        if !self.queue.is_empty() {
            return;
        }
        if !self.session.entries_open {
            self.session.open_entries(self.config.entry_countdown_ticks);
        }
        self.session.deleting = false;
        self.transition(RacePhase::EntriesOpen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::orchestrator::{EntrantDescriptor, OrchestratorConfig};
    use crate::prediction::{PredictionResolver, PredictionSettings};
    use crate::stats::StatsLedger;
    use crate::testing::{fixtures, MemoryStatsStore, MockPredictionMarket, MockRaceEngine};

    struct Rig {
        engine: Arc<MockRaceEngine>,
        market: Arc<MockPredictionMarket>,
        orchestrator: RaceOrchestrator,
    }

    fn rig(config: OrchestratorConfig) -> Rig {
        let engine = Arc::new(MockRaceEngine::new());
        let market = Arc::new(MockPredictionMarket::new());
        let ledger = StatsLedger::new(Arc::new(MemoryStatsStore::new()));
        let predictions = PredictionResolver::new(
            Some(market.clone()),
            PredictionSettings::default(),
            Duration::from_secs(1),
        );
        let orchestrator =
            RaceOrchestrator::new(config, engine.clone(), ledger, predictions).with_seed(11);
        Rig {
            engine,
            market,
            orchestrator,
        }
    }

    fn small_config() -> OrchestratorConfig {
        OrchestratorConfig {
            capacity: 3,
            entry_countdown_ticks: 4,
            start_countdown_ticks: 2,
            finish_hold_ticks: 2,
            fill_timeout_ticks: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_entry_countdown_only_runs_with_entrants() {
        let mut rig = rig(small_config());
        let t0 = Utc::now();
        let idle = fixtures::snapshot(RaceStatus::Stopped, &[]);

        for _ in 0..10 {
            rig.orchestrator.tick(&idle, t0).await;
        }
        assert_eq!(rig.orchestrator.phase(), RacePhase::EntriesOpen);
        assert_eq!(rig.orchestrator.session().entry_countdown, 4);

        rig.orchestrator
            .on_join(EntrantDescriptor::new("a", "Alice"), t0)
            .await;
        let field = fixtures::snapshot(RaceStatus::Stopped, &["a"]);
        rig.orchestrator.tick(&field, t0).await;
        assert_eq!(rig.orchestrator.phase(), RacePhase::CountdownToClose);

        for _ in 0..4 {
            rig.orchestrator.tick(&field, t0).await;
        }
        assert_eq!(rig.orchestrator.phase(), RacePhase::Filling);
        assert!(!rig.orchestrator.session().entries_open);
    }

    #[tokio::test]
    async fn test_capacity_closes_entries_immediately() {
        let mut rig = rig(small_config());
        let t0 = Utc::now();
        for id in ["a", "b", "c"] {
            let decision = rig
                .orchestrator
                .on_join(EntrantDescriptor::new(id, format!("Racer {}", id)), t0)
                .await;
            assert!(decision.is_accepted());
        }

        assert_eq!(rig.orchestrator.phase(), RacePhase::Filling);
        let late = rig
            .orchestrator
            .on_join(EntrantDescriptor::new("d", "Dora"), t0)
            .await;
        assert!(!late.is_accepted());
        assert_eq!(rig.orchestrator.session().roster.len(), 3);
    }

    #[tokio::test]
    async fn test_filling_adds_one_bot_per_tick() {
        let mut rig = rig(small_config());
        let t0 = Utc::now();
        rig.orchestrator
            .on_join(EntrantDescriptor::new("a", "Alice"), t0)
            .await;
        rig.orchestrator.manual_close();

        let field = fixtures::snapshot(RaceStatus::Stopped, &["a"]);
        rig.orchestrator.tick(&field, t0).await;
        assert_eq!(rig.orchestrator.session().roster.len(), 2);
        rig.orchestrator.tick(&field, t0).await;
        assert_eq!(rig.orchestrator.session().roster.len(), 3);

        let bots: Vec<_> = rig
            .orchestrator
            .session()
            .roster
            .iter()
            .filter(|e| e.is_bot)
            .collect();
        assert_eq!(bots.len(), 2);
        assert!(bots.iter().all(|b| b.owner_id == format!("UID_{}", b.name)));
        assert_ne!(bots[0].name, bots[1].name);
        assert!(bots.iter().all(|b| b.colors[0] != b.colors[1]));
        assert!(bots.iter().all(|b| b.colors[2] == "#222222"));
        assert_eq!(rig.engine.spawn_calls().await.len(), 3);
    }

    #[tokio::test]
    async fn test_full_race_cycle() {
        let mut rig = rig(small_config());
        let t0 = Utc::now();
        for id in ["a", "b", "c"] {
            rig.orchestrator
                .on_join(EntrantDescriptor::new(id, format!("Racer {}", id)), t0)
                .await;
        }
        let mut field = fixtures::snapshot(RaceStatus::Stopped, &["a", "b", "c"]);

        // Filling -> WaitingToStart as everybody is on track.
        rig.orchestrator.tick(&field, t0).await;
        assert_eq!(rig.orchestrator.phase(), RacePhase::WaitingToStart);

        // Two countdown ticks, then the start command goes out.
        rig.orchestrator.tick(&field, t0).await;
        rig.orchestrator.tick(&field, t0).await;
        assert!(rig.orchestrator.session().start_requested);
        assert!(rig.orchestrator.predictions().is_active());
        assert_eq!(rig.market.opened().await.len(), 1);

        field.status = RaceStatus::Formation;
        rig.orchestrator.tick(&field, t0).await;
        assert_eq!(rig.orchestrator.phase(), RacePhase::Racing);

        // Unknown status mid-race changes nothing.
        field.status = RaceStatus::Unknown;
        rig.orchestrator.tick(&field, t0).await;
        assert_eq!(rig.orchestrator.phase(), RacePhase::Racing);

        field.status = RaceStatus::GreenFlag;
        field.finishers = vec![
            fixtures::finish_entry("b", 1),
            fixtures::finish_entry("a", 2),
            fixtures::finish_entry("c", 3),
        ];
        rig.orchestrator.tick(&field, t0).await;
        assert_eq!(rig.orchestrator.phase(), RacePhase::Finishing);
        assert_eq!(rig.orchestrator.ledger().get("b").unwrap().wins, 1);
        assert_eq!(rig.market.resolved().await.len(), 1);
        assert!(!rig.orchestrator.predictions().is_active());

        rig.orchestrator.tick(&field, t0).await;
        rig.orchestrator.tick(&field, t0).await;
        assert_eq!(rig.orchestrator.phase(), RacePhase::Resetting);
        assert!(rig.orchestrator.session().roster.is_empty());

        // Drain the teardown: stop, delete, reset control, reopen.
        let mut empty = fixtures::snapshot(RaceStatus::Stopped, &[]);
        empty.finishers.clear();
        for _ in 0..12 {
            rig.orchestrator.tick(&empty, t0).await;
            if rig.orchestrator.phase() == RacePhase::EntriesOpen {
                break;
            }
        }

        assert_eq!(rig.orchestrator.phase(), RacePhase::EntriesOpen);
        let session = rig.orchestrator.session();
        assert!(session.entries_open);
        assert!(session.roster.is_empty());
        assert!(session.pending_spawns.is_empty());
        assert!(session.confirmed_spawns.is_empty());
        assert!(!session.deleting);
        assert_eq!(session.entry_countdown, 4);
    }

    #[tokio::test]
    async fn test_external_green_flag_jumps_to_racing() {
        let mut rig = rig(small_config());
        let t0 = Utc::now();
        rig.orchestrator
            .on_join(EntrantDescriptor::new("a", "Alice"), t0)
            .await;
        rig.orchestrator
            .on_join(EntrantDescriptor::new("b", "Bob"), t0)
            .await;

        let field = fixtures::snapshot(RaceStatus::GreenFlag, &["a", "b"]);
        rig.orchestrator.tick(&field, t0).await;

        assert_eq!(rig.orchestrator.phase(), RacePhase::Racing);
        assert!(!rig.orchestrator.session().entries_open);
        assert!(rig.orchestrator.predictions().is_active());
    }

    #[tokio::test]
    async fn test_green_flag_with_empty_roster_is_ignored() {
        let mut rig = rig(small_config());
        let field = fixtures::snapshot(RaceStatus::GreenFlag, &[]);
        rig.orchestrator.tick(&field, Utc::now()).await;
        assert_eq!(rig.orchestrator.phase(), RacePhase::EntriesOpen);
    }

    #[tokio::test]
    async fn test_reset_twice_refunds_once() {
        let mut rig = rig(small_config());
        let t0 = Utc::now();
        rig.orchestrator
            .on_join(EntrantDescriptor::new("a", "Alice"), t0)
            .await;
        rig.orchestrator
            .on_join(EntrantDescriptor::new("b", "Bob"), t0)
            .await;
        let field = fixtures::snapshot(RaceStatus::GreenFlag, &["a", "b"]);
        rig.orchestrator.tick(&field, t0).await;
        assert!(rig.orchestrator.predictions().is_active());

        rig.orchestrator.manual_reset().await;
        rig.orchestrator.reset_tick().await;
        rig.orchestrator.reset_tick().await;

        assert_eq!(rig.market.cancelled().await.len(), 1);
        assert!(!rig.orchestrator.predictions().is_active());
    }

    #[tokio::test]
    async fn test_below_minimum_without_fill_reopens() {
        let mut rig = rig(OrchestratorConfig {
            auto_fill: false,
            min_entrants: 2,
            ..small_config()
        });
        let t0 = Utc::now();
        rig.orchestrator
            .on_join(EntrantDescriptor::new("a", "Alice"), t0)
            .await;
        rig.orchestrator.manual_close();

        let field = fixtures::snapshot(RaceStatus::Stopped, &["a"]);
        rig.orchestrator.tick(&field, t0).await;

        assert_eq!(rig.orchestrator.phase(), RacePhase::CountdownToClose);
        assert!(rig.orchestrator.session().entries_open);
    }

    #[tokio::test]
    async fn test_fill_timeout_starts_with_partial_field() {
        let mut rig = rig(OrchestratorConfig {
            capacity: 2,
            ..small_config()
        });
        let t0 = Utc::now();
        rig.orchestrator
            .on_join(EntrantDescriptor::new("a", "Alice"), t0)
            .await;
        rig.orchestrator.manual_close();

        // The bot never shows up in telemetry.
        let field = fixtures::snapshot(RaceStatus::Stopped, &["a"]);
        for _ in 0..4 {
            rig.orchestrator.tick(&field, t0).await;
        }
        assert_eq!(rig.orchestrator.phase(), RacePhase::Filling);
        rig.orchestrator.tick(&field, t0).await;
        assert_eq!(rig.orchestrator.phase(), RacePhase::WaitingToStart);
    }

    #[tokio::test]
    async fn test_missing_bot_does_not_block_finish() {
        let mut rig = rig(OrchestratorConfig {
            capacity: 2,
            ..small_config()
        });
        let t0 = Utc::now();
        rig.orchestrator
            .on_join(EntrantDescriptor::new("a", "Alice"), t0)
            .await;
        rig.orchestrator.manual_close();

        let mut field = fixtures::snapshot(RaceStatus::Stopped, &["a"]);
        for _ in 0..5 {
            rig.orchestrator.tick(&field, t0).await;
        }
        assert_eq!(rig.orchestrator.phase(), RacePhase::WaitingToStart);
        assert_eq!(rig.orchestrator.session().roster.len(), 2);

        rig.orchestrator.tick(&field, t0).await;
        rig.orchestrator.tick(&field, t0).await;
        assert!(rig.orchestrator.session().start_requested);

        field.status = RaceStatus::Formation;
        rig.orchestrator.tick(&field, t0).await;
        assert_eq!(rig.orchestrator.phase(), RacePhase::Racing);

        field.status = RaceStatus::GreenFlag;
        field.finishers = vec![fixtures::finish_entry("a", 1)];
        rig.orchestrator.tick(&field, t0).await;

        assert_eq!(rig.orchestrator.phase(), RacePhase::Finishing);
        assert_eq!(rig.orchestrator.ledger().get("a").unwrap().wins, 1);
        assert_eq!(rig.market.resolved().await.len(), 1);
    }

    #[tokio::test]
    async fn test_race_waits_for_every_car_on_track() {
        let mut rig = rig(small_config());
        let t0 = Utc::now();
        for id in ["a", "b"] {
            rig.orchestrator
                .on_join(EntrantDescriptor::new(id, format!("Racer {}", id)), t0)
                .await;
        }
        let mut field = fixtures::racing_snapshot(&["a", "b"]);
        rig.orchestrator.tick(&field, t0).await;
        assert_eq!(rig.orchestrator.phase(), RacePhase::Racing);

        field.finishers = vec![fixtures::finish_entry("a", 1)];
        rig.orchestrator.tick(&field, t0).await;
        assert_eq!(rig.orchestrator.phase(), RacePhase::Racing);

        field.finishers.push(fixtures::finish_entry("b", 2));
        rig.orchestrator.tick(&field, t0).await;
        assert_eq!(rig.orchestrator.phase(), RacePhase::Finishing);
    }
}
