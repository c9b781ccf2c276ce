//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the race orchestrator.
///
/// Phase timers are expressed in ticks; one tick is one telemetry snapshot,
/// delivered at roughly `tick_rate_hz`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum entrants per race. Entries close as soon as it is reached.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Ticks the entry window stays open once the first entrant joins.
    #[serde(default = "default_entry_countdown")]
    pub entry_countdown_ticks: u32,

    /// Ticks between the end of filling and the start command.
    #[serde(default = "default_start_countdown")]
    pub start_countdown_ticks: u32,

    /// Ticks the results stay on screen before the reset sequence.
    #[serde(default = "default_finish_hold")]
    pub finish_hold_ticks: u32,

    /// Ticks to wait for filled bots to appear in telemetry before starting
    /// with whoever is on track.
    #[serde(default = "default_fill_timeout")]
    pub fill_timeout_ticks: u32,

    /// Expected telemetry cadence, used to turn ticks into seconds for display.
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: f64,

    /// Fill empty slots with bots once entries close.
    #[serde(default = "default_true")]
    pub auto_fill: bool,

    /// Entrants required before a race may start.
    #[serde(default = "default_min_entrants")]
    pub min_entrants: usize,

    /// How long a recently seen entrant may be missing before it is respawned.
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,

    /// Minimum time between spawn attempts for the same entrant.
    #[serde(default = "default_respawn_cooldown")]
    pub respawn_cooldown_secs: u64,

    /// Consecutive waits/failures before a queued command escalates.
    #[serde(default = "default_max_attempts")]
    pub max_command_attempts: u32,

    /// Times a timed-out confirmation command re-issues its call.
    #[serde(default = "default_max_restarts")]
    pub max_command_restarts: u32,

    /// Upper bound on a single engine or market call (milliseconds).
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    /// Operator alerts kept for the overlay and status responses.
    #[serde(default = "default_alert_history")]
    pub alert_history: usize,

    /// Name pool for bot entrants.
    #[serde(default = "default_bot_names")]
    pub bot_names: Vec<String>,

    /// Vehicle bodies to pick from when none is chosen.
    #[serde(default = "default_body_types")]
    pub body_types: Vec<String>,

    /// Palette for random liveries.
    #[serde(default = "default_colors")]
    pub colors: Vec<String>,

    /// Third livery slot for generated colors.
    #[serde(default = "default_accent_color")]
    pub accent_color: String,
}

fn default_capacity() -> usize {
    16
}

fn default_entry_countdown() -> u32 {
    400 // ~100s at 4Hz
}

fn default_start_countdown() -> u32 {
    30
}

fn default_finish_hold() -> u32 {
    300
}

fn default_fill_timeout() -> u32 {
    120
}

fn default_tick_rate() -> f64 {
    4.0
}

fn default_true() -> bool {
    true
}

fn default_min_entrants() -> usize {
    1
}

fn default_grace_period() -> u64 {
    5
}

fn default_respawn_cooldown() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    5
}

fn default_max_restarts() -> u32 {
    3
}

fn default_command_timeout() -> u64 {
    3000
}

fn default_alert_history() -> usize {
    20
}

fn default_bot_names() -> Vec<String> {
    [
        "DataStream_BOT",
        "CodeZero_BOT",
        "ByteShift_BOT",
        "AlgoRhythm_BOT",
        "NitroGen_BOT",
        "RaceGhost_BOT",
        "ApexDrift_BOT",
        "TurboKat_BOT",
        "CypherKing_BOT",
        "DeltaWing_BOT",
        "EchoPrime_BOT",
        "NexusRex_BOT",
        "QueryBot_BOT",
        "StatMaster_BOT",
        "LogicFlow_BOT",
        "PilotOne_BOT",
        "GlitchRider_BOT",
        "IronMuse_BOT",
        "VectorX_BOT",
        "ZenithAI_BOT",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_body_types() -> Vec<String> {
    ["typea", "typeb", "typec", "typed"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_colors() -> Vec<String> {
    [
        "#2926eb", "#FF0000", "#00FF00", "#FFFFFF", "#FFFF00", "#000000", "#800080", "#FFA500",
        "#00008B", "#FFC0CB", "#DD1919", "#494949", "#DD4719", "#00FFFF", "#FF00FF", "#ADFF2F",
        "#4B0082", "#A52A2A", "#008000", "#C0C0C0", "#808000", "#40E0D0", "#DAA520", "#B22222",
        "#5F9EA0", "#2F4F4F", "#9932CC", "#FF7F50",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_accent_color() -> String {
    "#222222".to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            entry_countdown_ticks: default_entry_countdown(),
            start_countdown_ticks: default_start_countdown(),
            finish_hold_ticks: default_finish_hold(),
            fill_timeout_ticks: default_fill_timeout(),
            tick_rate_hz: default_tick_rate(),
            auto_fill: true,
            min_entrants: default_min_entrants(),
            grace_period_secs: default_grace_period(),
            respawn_cooldown_secs: default_respawn_cooldown(),
            max_command_attempts: default_max_attempts(),
            max_command_restarts: default_max_restarts(),
            command_timeout_ms: default_command_timeout(),
            alert_history: default_alert_history(),
            bot_names: default_bot_names(),
            body_types: default_body_types(),
            colors: default_colors(),
            accent_color: default_accent_color(),
        }
    }
}

impl OrchestratorConfig {
    /// Approximate wall-clock seconds for a tick count.
    pub fn seconds_from_ticks(&self, ticks: u32) -> u64 {
        (ticks as f64 / self.tick_rate_hz).round().max(0.0) as u64
    }

    pub fn grace_period(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.grace_period_secs as i64)
    }

    pub fn respawn_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.respawn_cooldown_secs as i64)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}
