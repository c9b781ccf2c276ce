//! HTTP command bridge client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::EngineConfig;

use super::{EngineError, RaceEngine, RaceStatus, SpawnRequest};

const SET_RACE: &str = "setRAC";
const DELETE_ALL: &str = "delALL";
const SPAWN_CAR: &str = "genCAR";
const REMOVE_CAR: &str = "delMID";
const RESET_RACE: &str = "resRAC";

#[derive(Debug, Serialize)]
struct CommandEnvelope<'a> {
    cmd: &'a str,
    val: Value,
}

/// Race engine reached through `POST {url}/api/receive_command`.
pub struct HttpRaceEngine {
    client: Client,
    config: EngineConfig,
}

impl HttpRaceEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    async fn send(&self, cmd: &str, val: Value) -> Result<(), EngineError> {
        let url = format!("{}/api/receive_command", self.base_url());
        debug!("Engine command {} -> {}", cmd, val);

        let response = self
            .client
            .post(&url)
            .json(&CommandEnvelope { cmd, val })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::Timeout
                } else if e.is_connect() {
                    EngineError::ConnectionFailed(e.to_string())
                } else {
                    EngineError::Internal(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Rejected(format!(
                "{} returned HTTP {}: {}",
                cmd,
                status,
                body.chars().take(100).collect::<String>()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl RaceEngine for HttpRaceEngine {
    fn name(&self) -> &str {
        "http"
    }

    async fn set_race_status(&self, status: RaceStatus) -> Result<(), EngineError> {
        let code = status
            .code()
            .ok_or_else(|| EngineError::Rejected(format!("cannot set race to {}", status)))?;
        self.send(SET_RACE, json!(code.to_string())).await
    }

    async fn delete_all_participants(&self) -> Result<(), EngineError> {
        self.send(DELETE_ALL, json!("all")).await
    }

    async fn spawn_participant(&self, request: &SpawnRequest) -> Result<(), EngineError> {
        self.send(
            SPAWN_CAR,
            json!([
                request.owner_id,
                request.name,
                request.body,
                request.colors.join(",")
            ]),
        )
        .await
    }

    async fn remove_participant(&self, owner_id: &str) -> Result<(), EngineError> {
        self.send(REMOVE_CAR, json!(owner_id)).await
    }

    async fn reset_control(&self) -> Result<(), EngineError> {
        self.send(RESET_RACE, json!("all")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let envelope = CommandEnvelope {
            cmd: SPAWN_CAR,
            val: json!(["u1", "Ana", "typea", "#FFFFFF,#000000,#222222"]),
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["cmd"], "genCAR");
        assert_eq!(value["val"][3], "#FFFFFF,#000000,#222222");
    }

    #[test]
    fn test_base_url_trims_slash() {
        let engine = HttpRaceEngine::new(EngineConfig {
            url: "http://127.0.0.1:5000/".to_string(),
            timeout_secs: 1,
        })
        .unwrap();
        assert_eq!(engine.base_url(), "http://127.0.0.1:5000");
    }

    #[tokio::test]
    async fn test_unreachable_engine_errors() {
        let engine = HttpRaceEngine::new(EngineConfig {
            url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
        })
        .unwrap();
        let result = engine.reset_control().await;
        assert!(matches!(
            result,
            Err(EngineError::ConnectionFailed(_)) | Err(EngineError::Timeout) | Err(EngineError::Internal(_))
        ));
    }
}
