use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::orchestrator::OrchestratorConfig;
use crate::prediction::PredictionSettings;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub predictions: Option<PredictionConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Stats database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("pitwall.db")
}

/// Race engine command bridge configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Base URL of the engine bridge (e.g., "http://127.0.0.1:5000")
    pub url: String,
    /// Request timeout in seconds (default: 5)
    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u32,
}

fn default_engine_timeout() -> u32 {
    5
}

/// Telemetry ingest configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Snapshot file written by the engine. When unset, snapshots are only
    /// accepted over HTTP.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// How often the snapshot file is checked for changes (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            file: None,
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_poll_interval() -> u64 {
    250
}

/// Prediction market (Twitch Helix) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PredictionConfig {
    /// Whether predictions open automatically at race start.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub broadcaster_id: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    /// Voting window in seconds (default: 180)
    #[serde(default = "default_window")]
    pub window_secs: u32,
    /// Individually listed outcomes before the catch-all bucket (default: 9)
    #[serde(default = "default_max_outcomes")]
    pub max_outcomes: usize,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_prediction_timeout")]
    pub timeout_secs: u32,
}

impl PredictionConfig {
    /// Resolver settings derived from this configuration.
    pub fn settings(&self) -> PredictionSettings {
        PredictionSettings {
            enabled: self.enabled,
            max_outcomes: self.max_outcomes,
            window_secs: self.window_secs,
            title: self.title.clone(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_api_url() -> String {
    "https://api.twitch.tv/helix".to_string()
}

fn default_token_url() -> String {
    "https://id.twitch.tv/oauth2/token".to_string()
}

pub(crate) fn default_window() -> u32 {
    180
}

pub(crate) fn default_max_outcomes() -> usize {
    9
}

pub(crate) fn default_title() -> String {
    "Who will win the next race?".to_string()
}

fn default_prediction_timeout() -> u32 {
    10
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    pub telemetry: TelemetryConfig,
    pub orchestrator: OrchestratorConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predictions: Option<SanitizedPredictionConfig>,
}

/// Sanitized prediction config (credentials hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedPredictionConfig {
    pub enabled: bool,
    pub api_url: String,
    pub broadcaster_id: String,
    pub client_id_configured: bool,
    pub access_token_configured: bool,
    pub refresh_configured: bool,
    pub window_secs: u32,
    pub max_outcomes: usize,
    pub title: String,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            engine: config.engine.clone(),
            telemetry: config.telemetry.clone(),
            orchestrator: config.orchestrator.clone(),
            predictions: config.predictions.as_ref().map(|p| SanitizedPredictionConfig {
                enabled: p.enabled,
                api_url: p.api_url.clone(),
                broadcaster_id: p.broadcaster_id.clone(),
                client_id_configured: !p.client_id.is_empty(),
                access_token_configured: !p.access_token.is_empty(),
                refresh_configured: !p.refresh_token.is_empty() && !p.client_secret.is_empty(),
                window_secs: p.window_secs,
                max_outcomes: p.max_outcomes,
                title: p.title.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_defaults() {
        let toml = r#"
[engine]
url = "http://127.0.0.1:5000"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.engine.timeout_secs, 5);
        assert_eq!(config.database.path, PathBuf::from("pitwall.db"));
        assert!(config.telemetry.file.is_none());
        assert_eq!(config.telemetry.poll_interval_ms, 250);
        assert_eq!(config.orchestrator.capacity, 16);
        assert!(config.predictions.is_none());
    }

    #[test]
    fn test_deserialize_predictions_defaults() {
        let toml = r#"
[engine]
url = "http://127.0.0.1:5000"

[predictions]
client_id = "abc"
broadcaster_id = "1234"
access_token = "token"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let predictions = config.predictions.unwrap();
        assert!(predictions.enabled);
        assert_eq!(predictions.window_secs, 180);
        assert_eq!(predictions.max_outcomes, 9);
        assert_eq!(predictions.title, "Who will win the next race?");
        assert_eq!(predictions.api_url, "https://api.twitch.tv/helix");
    }

    #[test]
    fn test_sanitized_config_hides_tokens() {
        let toml = r#"
[engine]
url = "http://127.0.0.1:5000"

[predictions]
client_id = "abc"
client_secret = "very-secret"
broadcaster_id = "1234"
access_token = "token"
refresh_token = "refresh"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        let json = serde_json::to_string(&sanitized).unwrap();

        assert!(!json.contains("very-secret"));
        assert!(!json.contains("\"token\""));
        assert!(!json.contains("refresh\""));
        let predictions = sanitized.predictions.unwrap();
        assert!(predictions.access_token_configured);
        assert!(predictions.refresh_configured);
    }
}
