use std::collections::HashSet;

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Engine URL is set
/// - Orchestrator capacity, tick rate and retry thresholds are positive
/// - Bot generation pools are usable
/// - Prediction outcome cap allows at least one individual outcome
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.engine.url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "engine.url cannot be empty".to_string(),
        ));
    }

    let orch = &config.orchestrator;
    if orch.capacity == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.capacity must be at least 1".to_string(),
        ));
    }
    if orch.tick_rate_hz.is_nan() || orch.tick_rate_hz <= 0.0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.tick_rate_hz must be positive".to_string(),
        ));
    }
    if orch.max_command_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.max_command_attempts must be at least 1".to_string(),
        ));
    }
    if orch.body_types.is_empty() {
        return Err(ConfigError::ValidationError(
            "orchestrator.body_types cannot be empty".to_string(),
        ));
    }
    let distinct_colors: HashSet<&String> = orch.colors.iter().collect();
    if distinct_colors.len() < 2 {
        return Err(ConfigError::ValidationError(
            "orchestrator.colors needs at least two distinct colors".to_string(),
        ));
    }

    if let Some(predictions) = &config.predictions {
        if predictions.max_outcomes == 0 {
            return Err(ConfigError::ValidationError(
                "predictions.max_outcomes must be at least 1".to_string(),
            ));
        }
        if predictions.broadcaster_id.is_empty() {
            return Err(ConfigError::ValidationError(
                "predictions.broadcaster_id cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}
