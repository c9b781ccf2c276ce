//! Race lifecycle integration tests.
//!
//! These tests drive a full race cycle through the orchestrator with a mock
//! engine and a SQLite stats store on disk:
//! entries_open -> countdown_to_close -> filling -> waiting_to_start ->
//! racing -> finishing -> resetting -> entries_open

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;

use pitwall_core::{
    orchestrator::QueueEvent,
    testing::{fixtures, EngineCall, MockPredictionMarket, MockRaceEngine},
    EntrantDescriptor, EngineError, OrchestratorConfig, PredictionResolver, PredictionSettings,
    RaceOrchestrator, RacePhase, RaceStatus, SqliteStatsStore, StatsLedger, TelemetrySnapshot,
};

/// Test helper holding the mocks and the database directory.
struct TestHarness {
    engine: Arc<MockRaceEngine>,
    market: Arc<MockPredictionMarket>,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self {
            engine: Arc::new(MockRaceEngine::new()),
            market: Arc::new(MockPredictionMarket::new()),
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    fn ledger(&self) -> StatsLedger {
        let path = self.temp_dir.path().join("stats.db");
        let store = SqliteStatsStore::new(&path).expect("Failed to create stats store");
        StatsLedger::new(Arc::new(store))
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            capacity: 2,
            entry_countdown_ticks: 3,
            start_countdown_ticks: 1,
            finish_hold_ticks: 1,
            fill_timeout_ticks: 3,
            max_command_attempts: 2,
            max_command_restarts: 1,
            ..Default::default()
        }
    }

    fn orchestrator(&self, config: OrchestratorConfig) -> RaceOrchestrator {
        let predictions = PredictionResolver::new(
            Some(self.market.clone()),
            PredictionSettings::default(),
            Duration::from_secs(1),
        );
        RaceOrchestrator::new(config, self.engine.clone(), self.ledger(), predictions).with_seed(7)
    }
}

/// Tick with `snapshot` until `phase` is reached. Returns the ticks taken.
async fn drive_until(
    orchestrator: &mut RaceOrchestrator,
    snapshot: &TelemetrySnapshot,
    phase: RacePhase,
    max_ticks: usize,
) -> usize {
    for tick in 1..=max_ticks {
        orchestrator.tick(snapshot, Utc::now()).await;
        if orchestrator.phase() == phase {
            return tick;
        }
    }
    panic!(
        "Did not reach {} within {} ticks (stuck in {})",
        phase,
        max_ticks,
        orchestrator.phase()
    );
}

#[tokio::test]
async fn test_full_race_persists_results() {
    let harness = TestHarness::new();
    let mut orchestrator = harness.orchestrator(TestHarness::config());

    for (id, name) in [("a", "Racer a"), ("b", "Racer b")] {
        let decision = orchestrator
            .on_join(EntrantDescriptor::new(id, name), Utc::now())
            .await;
        assert!(decision.is_accepted());
    }
    assert_eq!(orchestrator.phase(), RacePhase::Filling);

    let stopped = fixtures::snapshot(RaceStatus::Stopped, &["a", "b"]);
    drive_until(&mut orchestrator, &stopped, RacePhase::WaitingToStart, 2).await;
    orchestrator.tick(&stopped, Utc::now()).await;
    assert_eq!(orchestrator.queued_commands(), vec!["confirm_race_start"]);
    assert!(orchestrator.predictions().is_active());

    let green = fixtures::racing_snapshot(&["a", "b"]);
    drive_until(&mut orchestrator, &green, RacePhase::Racing, 2).await;

    let mut finished = green.clone();
    finished.finishers = vec![
        fixtures::finish_entry_with_lap("b", 1, 71_250),
        fixtures::finish_entry_with_lap("a", 2, 72_000),
    ];
    drive_until(&mut orchestrator, &finished, RacePhase::Finishing, 1).await;
    assert_eq!(harness.market.resolved().await.len(), 1);

    drive_until(&mut orchestrator, &finished, RacePhase::Resetting, 2).await;
    let empty = fixtures::snapshot(RaceStatus::Stopped, &[]);
    drive_until(&mut orchestrator, &empty, RacePhase::EntriesOpen, 12).await;

    let session = orchestrator.session();
    assert!(session.entries_open);
    assert!(session.roster.is_empty());
    assert!(orchestrator.queued_commands().is_empty());

    let calls = harness.engine.calls().await;
    for expected in [
        EngineCall::SetRaceStatus(RaceStatus::Formation),
        EngineCall::SetRaceStatus(RaceStatus::Stopped),
        EngineCall::DeleteAll,
        EngineCall::ResetControl,
    ] {
        assert!(calls.contains(&expected), "missing {:?}", expected);
    }

    let overlay = orchestrator.overlay_summary();
    assert!(overlay.ticker.contains(&"Last Race Winner: Racer b".to_string()));
    assert!(overlay
        .ticker
        .contains(&"Current Track Record: 01:11.250 by Racer b".to_string()));

    // A fresh ledger on the same database sees the race.
    let reopened = harness.ledger();
    assert_eq!(reopened.get("b").unwrap().wins, 1);
    assert_eq!(reopened.get("a").unwrap().races_entered, 1);
    assert_eq!(reopened.track_record().unwrap().holder, "Racer b");
}

#[tokio::test]
async fn test_unconfirmed_stop_is_abandoned_and_reset_continues() {
    let harness = TestHarness::new();
    let mut orchestrator = harness.orchestrator(TestHarness::config());
    orchestrator
        .on_join(EntrantDescriptor::new("a", "Alice"), Utc::now())
        .await;
    orchestrator.manual_reset().await;
    assert_eq!(orchestrator.phase(), RacePhase::Resetting);

    // The engine keeps reporting green: the stop is never confirmed.
    let green = fixtures::racing_snapshot(&[]);
    let mut events = Vec::new();
    for _ in 0..4 {
        events.push(orchestrator.tick(&green, Utc::now()).await.queue);
    }

    assert!(matches!(events[1], QueueEvent::Restarted { restarts: 1, .. }));
    assert!(matches!(events[3], QueueEvent::Abandoned { .. }));
    let stops = harness
        .engine
        .calls()
        .await
        .into_iter()
        .filter(|c| *c == EngineCall::SetRaceStatus(RaceStatus::Stopped))
        .count();
    assert_eq!(stops, 2);

    let alerts = orchestrator.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].command, "confirm_race_stop");
    assert!(alerts[0].message.contains("abandoned"));

    // The rest of the teardown still runs.
    let empty = fixtures::snapshot(RaceStatus::Stopped, &[]);
    drive_until(&mut orchestrator, &empty, RacePhase::EntriesOpen, 8).await;
    assert!(harness.engine.calls().await.contains(&EngineCall::ResetControl));
    assert_eq!(orchestrator.overlay_summary().alerts.len(), 1);
}

#[tokio::test]
async fn test_saved_car_is_used_on_join() {
    let harness = TestHarness::new();
    let mut orchestrator = harness.orchestrator(OrchestratorConfig {
        capacity: 4,
        ..TestHarness::config()
    });
    let livery = fixtures::colors();

    orchestrator
        .on_join(EntrantDescriptor::new("a", "Alice").with_car("typed", livery.clone()), Utc::now())
        .await;
    assert!(orchestrator.save_car("a", "Alice", None, None));
    assert!(orchestrator.on_leave("a").await);

    let decision = orchestrator
        .on_join(
            EntrantDescriptor {
                body: Some("saved".to_string()),
                ..EntrantDescriptor::new("a", "Alice")
            },
            Utc::now(),
        )
        .await;
    assert!(decision.is_accepted());

    let entrant = &orchestrator.session().roster[0];
    assert_eq!(entrant.body, "typed");
    assert_eq!(entrant.colors, livery);

    let spawns = harness.engine.spawn_calls().await;
    assert_eq!(spawns.len(), 2);
    assert_eq!(spawns[1].body, "typed");
}

#[tokio::test]
async fn test_saved_car_falls_back_to_random_when_missing() {
    let harness = TestHarness::new();
    let config = OrchestratorConfig {
        capacity: 4,
        ..TestHarness::config()
    };
    let bodies = config.body_types.clone();
    let mut orchestrator = harness.orchestrator(config);

    orchestrator
        .on_join(
            EntrantDescriptor {
                body: Some("saved".to_string()),
                ..EntrantDescriptor::new("z", "Zed")
            },
            Utc::now(),
        )
        .await;

    let entrant = &orchestrator.session().roster[0];
    assert!(bodies.contains(&entrant.body));
    assert_ne!(entrant.colors[0], entrant.colors[1]);
}

#[tokio::test]
async fn test_leave_is_refused_once_the_race_is_on() {
    let harness = TestHarness::new();
    let mut orchestrator = harness.orchestrator(TestHarness::config());
    orchestrator
        .on_join(EntrantDescriptor::new("a", "Alice"), Utc::now())
        .await;
    orchestrator
        .on_join(EntrantDescriptor::new("b", "Bob"), Utc::now())
        .await;

    let green = fixtures::racing_snapshot(&["a", "b"]);
    orchestrator.tick(&green, Utc::now()).await;
    assert_eq!(orchestrator.phase(), RacePhase::Racing);

    assert!(!orchestrator.on_leave("a").await);
    assert_eq!(orchestrator.session().roster.len(), 2);
}

#[tokio::test]
async fn test_failed_leave_keeps_entrant() {
    let harness = TestHarness::new();
    let mut orchestrator = harness.orchestrator(OrchestratorConfig {
        capacity: 4,
        ..TestHarness::config()
    });
    orchestrator
        .on_join(EntrantDescriptor::new("a", "Alice"), Utc::now())
        .await;

    harness
        .engine
        .set_next_error(EngineError::ConnectionFailed("refused".to_string()))
        .await;

    assert!(!orchestrator.on_leave("a").await);
    assert!(orchestrator.session().is_entered("a"));
    assert!(orchestrator.on_leave("a").await);
    assert!(!orchestrator.session().is_entered("a"));
}

#[tokio::test]
async fn test_force_start_fills_then_launches() {
    let harness = TestHarness::new();
    let mut orchestrator = harness.orchestrator(OrchestratorConfig {
        capacity: 3,
        start_countdown_ticks: 50,
        ..TestHarness::config()
    });
    orchestrator
        .on_join(EntrantDescriptor::new("a", "Alice"), Utc::now())
        .await;

    let response = orchestrator.manual_start();
    assert!(response.accepted);
    assert_eq!(orchestrator.phase(), RacePhase::Filling);

    // Two bots, then everybody is on track.
    let solo = fixtures::snapshot(RaceStatus::Stopped, &["a"]);
    orchestrator.tick(&solo, Utc::now()).await;
    orchestrator.tick(&solo, Utc::now()).await;
    assert_eq!(orchestrator.session().roster.len(), 3);

    let ids: Vec<String> = orchestrator
        .session()
        .roster
        .iter()
        .map(|e| e.owner_id.clone())
        .collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let field = fixtures::snapshot(RaceStatus::Stopped, &id_refs);
    drive_until(&mut orchestrator, &field, RacePhase::WaitingToStart, 1).await;

    // Fast start skips the 50-tick countdown.
    orchestrator.tick(&field, Utc::now()).await;
    assert!(orchestrator.session().start_requested);

    let again = orchestrator.manual_start();
    assert!(!again.accepted);
}

#[tokio::test]
async fn test_missing_car_is_respawned_after_grace() {
    let harness = TestHarness::new();
    let mut orchestrator = harness.orchestrator(OrchestratorConfig {
        capacity: 4,
        ..TestHarness::config()
    });
    let t0 = Utc::now();
    orchestrator
        .on_join(EntrantDescriptor::new("a", "Alice"), t0)
        .await;

    let present = fixtures::snapshot(RaceStatus::Stopped, &["a"]);
    orchestrator.tick(&present, t0).await;

    let gone = fixtures::snapshot(RaceStatus::Stopped, &[]);
    let report = orchestrator
        .tick(&gone, t0 + chrono::Duration::seconds(2))
        .await;
    assert!(report.reconcile.respawned.is_empty());

    let report = orchestrator
        .tick(&gone, t0 + chrono::Duration::seconds(6))
        .await;
    assert_eq!(report.reconcile.respawned, vec!["a"]);
    assert_eq!(harness.engine.spawn_calls().await.len(), 2);
}
