//! Twitch Helix predictions client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::PredictionConfig;

use super::{MarketRequest, OpenedMarket, PredictionError, PredictionMarket};

/// Helix rejects prediction titles longer than this.
const MAX_PREDICTION_TITLE_LEN: usize = 45;

#[derive(Debug, Clone)]
struct Tokens {
    access: String,
    refresh: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PredictionEnvelope {
    data: Vec<PredictionData>,
}

#[derive(Debug, Deserialize)]
struct PredictionData {
    id: String,
    #[serde(default)]
    outcomes: Vec<OutcomeData>,
}

#[derive(Debug, Deserialize)]
struct OutcomeData {
    id: String,
    title: String,
}

/// Prediction market backed by the Twitch Helix API.
pub struct TwitchPredictionClient {
    client: Client,
    config: PredictionConfig,
    tokens: RwLock<Tokens>,
}

impl TwitchPredictionClient {
    pub fn new(config: PredictionConfig) -> Result<Self, PredictionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| PredictionError::Api(e.to_string()))?;

        let tokens = Tokens {
            access: config.access_token.clone(),
            refresh: config.refresh_token.clone(),
        };

        Ok(Self {
            client,
            config,
            tokens: RwLock::new(tokens),
        })
    }

    fn predictions_url(&self) -> String {
        format!("{}/predictions", self.config.api_url.trim_end_matches('/'))
    }

    fn map_send_error(e: reqwest::Error) -> PredictionError {
        if e.is_timeout() {
            PredictionError::Timeout
        } else {
            PredictionError::Api(e.to_string())
        }
    }

    /// Exchange the refresh token for a new access token.
    async fn refresh_token(&self) -> Result<(), PredictionError> {
        let refresh = self.tokens.read().await.refresh.clone();
        if refresh.is_empty() || self.config.client_secret.is_empty() {
            return Err(PredictionError::Authentication(
                "access token rejected and no refresh credentials configured".to_string(),
            ));
        }

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        if !response.status().is_success() {
            return Err(PredictionError::Authentication(format!(
                "token refresh failed with HTTP {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| PredictionError::InvalidResponse(e.to_string()))?;

        let mut tokens = self.tokens.write().await;
        tokens.access = body.access_token;
        if let Some(new_refresh) = body.refresh_token {
            tokens.refresh = new_refresh;
        }
        info!("Refreshed prediction API access token");
        Ok(())
    }

    async fn send_once(&self, method: Method, payload: &Value) -> Result<reqwest::Response, PredictionError> {
        let access = self.tokens.read().await.access.clone();
        self.client
            .request(method, self.predictions_url())
            .bearer_auth(access)
            .header("Client-Id", &self.config.client_id)
            .json(payload)
            .send()
            .await
            .map_err(Self::map_send_error)
    }

    /// Send a request, refreshing the access token once on 401.
    async fn send(&self, method: Method, payload: Value) -> Result<Value, PredictionError> {
        let mut response = self.send_once(method.clone(), &payload).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Prediction API returned 401, refreshing token");
            self.refresh_token().await?;
            response = self.send_once(method, &payload).await?;
        }

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(PredictionError::Authentication(
                "access token rejected after refresh".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PredictionError::Api(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| PredictionError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl PredictionMarket for TwitchPredictionClient {
    fn name(&self) -> &str {
        "twitch"
    }

    async fn open(&self, request: &MarketRequest) -> Result<OpenedMarket, PredictionError> {
        let outcomes: Vec<Value> = request
            .outcomes
            .iter()
            .map(|title| json!({ "title": title }))
            .collect();
        let payload = json!({
            "broadcaster_id": self.config.broadcaster_id,
            "title": request.title.chars().take(MAX_PREDICTION_TITLE_LEN).collect::<String>(),
            "outcomes": outcomes,
            "prediction_window": request.window_secs,
        });

        let body = self.send(Method::POST, payload).await?;
        let envelope: PredictionEnvelope = serde_json::from_value(body)
            .map_err(|e| PredictionError::InvalidResponse(e.to_string()))?;
        let prediction = envelope
            .data
            .into_iter()
            .next()
            .ok_or_else(|| PredictionError::InvalidResponse("empty data array".to_string()))?;

        let outcome_ids: HashMap<String, String> = prediction
            .outcomes
            .into_iter()
            .map(|o| (o.title, o.id))
            .collect();
        debug!(
            "Helix prediction {} created with {} outcomes",
            prediction.id,
            outcome_ids.len()
        );

        Ok(OpenedMarket {
            market_id: prediction.id,
            outcome_ids,
        })
    }

    async fn resolve(&self, market_id: &str, winning_outcome_id: &str) -> Result<(), PredictionError> {
        let payload = json!({
            "broadcaster_id": self.config.broadcaster_id,
            "id": market_id,
            "status": "RESOLVED",
            "winning_outcome_id": winning_outcome_id,
        });
        self.send(Method::PATCH, payload).await.map(|_| ())
    }

    async fn cancel(&self, market_id: &str) -> Result<(), PredictionError> {
        let payload = json!({
            "broadcaster_id": self.config.broadcaster_id,
            "id": market_id,
            "status": "CANCELED",
        });
        self.send(Method::PATCH, payload).await.map(|_| ())
    }
}
