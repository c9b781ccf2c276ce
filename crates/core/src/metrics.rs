//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Command queue outcomes and engine calls
//! - Roster reconciliation and joins
//! - Race lifecycle (phase transitions, completed races)
//! - Prediction markets

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Command Queue
// =============================================================================

/// Queued command attempts by command and outcome.
pub static COMMANDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pitwall_commands_total", "Queued command attempts by outcome"),
        &["command", "outcome"], // "succeeded", "waiting", "retrying", "restarted", "abandoned"
    )
    .unwrap()
});

/// Queue depth after each tick.
pub static QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("pitwall_command_queue_depth", "Commands waiting in the queue").unwrap()
});

/// Engine call duration in seconds.
pub static ENGINE_CALL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "pitwall_engine_call_duration_seconds",
            "Duration of race engine calls",
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["call", "result"],
    )
    .unwrap()
});

// =============================================================================
// Roster
// =============================================================================

/// Corrective spawns issued by the reconciler.
pub static CORRECTIVE_SPAWNS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "pitwall_corrective_spawns_total",
        "Spawns re-issued for entrants missing from telemetry",
    )
    .unwrap()
});

/// Join requests by result.
pub static JOINS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pitwall_joins_total", "Join requests by result"),
        &["result"], // "accepted", "rejected", "bot"
    )
    .unwrap()
});

/// Current roster size.
pub static ROSTER_SIZE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("pitwall_roster_size", "Entrants currently on the roster").unwrap()
});

// =============================================================================
// Race Lifecycle
// =============================================================================

/// Phase transitions.
pub static PHASE_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pitwall_phase_transitions_total", "Race phase transitions"),
        &["from", "to"],
    )
    .unwrap()
});

/// Races completed and recorded in the ledger.
pub static RACES_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("pitwall_races_completed_total", "Races completed").unwrap()
});

// =============================================================================
// Predictions
// =============================================================================

/// Prediction market operations by result.
pub static PREDICTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pitwall_predictions_total", "Prediction market operations"),
        &["result"], // "opened", "resolved", "cancelled", and "*_failed"
    )
    .unwrap()
});

// =============================================================================
// Registration Helper
// =============================================================================

/// Returns all core metrics for registration with a Prometheus registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Command queue
        Box::new(COMMANDS_TOTAL.clone()),
        Box::new(QUEUE_DEPTH.clone()),
        Box::new(ENGINE_CALL_DURATION.clone()),
        // Roster
        Box::new(CORRECTIVE_SPAWNS.clone()),
        Box::new(JOINS_TOTAL.clone()),
        Box::new(ROSTER_SIZE.clone()),
        // Lifecycle
        Box::new(PHASE_TRANSITIONS.clone()),
        Box::new(RACES_COMPLETED.clone()),
        // Predictions
        Box::new(PREDICTIONS_TOTAL.clone()),
    ]
}
