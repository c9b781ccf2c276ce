pub mod config;
pub mod engine;
pub mod metrics;
pub mod orchestrator;
pub mod prediction;
pub mod stats;
pub mod telemetry;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    EngineConfig, PredictionConfig, SanitizedConfig, ServerConfig, TelemetryConfig,
};
pub use engine::{EngineError, HttpRaceEngine, RaceEngine, RaceStatus, SpawnRequest};
pub use orchestrator::{
    spawn_orchestrator, AdminAction, AdminResponse, Entrant, EntrantDescriptor, JoinDecision,
    OperatorAlert, OrchestratorConfig, OrchestratorError, OrchestratorHandle, OrchestratorStatus,
    OverlaySummary, RaceOrchestrator, RacePhase,
};
pub use prediction::{
    PredictionError, PredictionMarket, PredictionResolver, PredictionSettings, PredictionState,
    TwitchPredictionClient,
};
pub use stats::{
    ColorSet, LapTime, ParticipantStats, SqliteStatsStore, StatsError, StatsLedger, StatsStore,
    TrackRecord,
};
pub use telemetry::{
    FinishEntry, ParticipantTelemetry, TelemetryError, TelemetryPoller, TelemetrySnapshot,
};
