//! Prediction market types and trait.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{default_max_outcomes, default_title, default_window};

/// Title of the catch-all outcome for entrants beyond the outcome limit.
pub const FIELD_OUTCOME_TITLE: &str = "The Field (Other Racers)";

/// Longest outcome title the market accepts.
pub const MAX_OUTCOME_TITLE_LEN: usize = 25;

/// Errors from the prediction market.
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("Prediction market not configured")]
    NotConfigured,

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Parameters for opening a market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketRequest {
    pub title: String,
    /// Outcome titles in display order.
    pub outcomes: Vec<String>,
    pub window_secs: u32,
}

/// A market the external service accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedMarket {
    pub market_id: String,
    /// Outcome title -> external outcome id.
    pub outcome_ids: HashMap<String, String>,
}

/// External prediction market.
#[async_trait]
pub trait PredictionMarket: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    async fn open(&self, request: &MarketRequest) -> Result<OpenedMarket, PredictionError>;

    async fn resolve(&self, market_id: &str, winning_outcome_id: &str) -> Result<(), PredictionError>;

    /// Cancel and refund.
    async fn cancel(&self, market_id: &str) -> Result<(), PredictionError>;
}

/// State of the currently open market.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PredictionState {
    pub active: bool,
    pub market_id: Option<String>,
    /// Outcome title -> external outcome id.
    pub outcome_ids: HashMap<String, String>,
    /// Individually listed entrant name -> outcome title.
    pub tracked: HashMap<String, String>,
    /// Entrant names absorbed by the catch-all outcome.
    pub field_members: Vec<String>,
}

/// Resolver behavior, independent of the market backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionSettings {
    pub enabled: bool,
    pub max_outcomes: usize,
    pub window_secs: u32,
    pub title: String,
}

impl Default for PredictionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_outcomes: default_max_outcomes(),
            window_secs: default_window(),
            title: default_title(),
        }
    }
}
