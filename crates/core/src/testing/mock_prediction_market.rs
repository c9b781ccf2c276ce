//! Mock prediction market for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::prediction::{MarketRequest, OpenedMarket, PredictionError, PredictionMarket};

/// Mock implementation of the PredictionMarket trait.
///
/// `open` accepts every request and assigns sequential ids to the market and
/// each outcome title.
#[derive(Debug, Default)]
pub struct MockPredictionMarket {
    opened: Arc<RwLock<Vec<OpenedMarket>>>,
    requests: Arc<RwLock<Vec<MarketRequest>>>,
    /// (market id, winning outcome id)
    resolved: Arc<RwLock<Vec<(String, String)>>>,
    cancelled: Arc<RwLock<Vec<String>>>,
    next_error: Arc<RwLock<Option<PredictionError>>>,
    counter: Arc<RwLock<u32>>,
}

impl MockPredictionMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn opened(&self) -> Vec<OpenedMarket> {
        self.opened.read().await.clone()
    }

    pub async fn requests(&self) -> Vec<MarketRequest> {
        self.requests.read().await.clone()
    }

    pub async fn resolved(&self) -> Vec<(String, String)> {
        self.resolved.read().await.clone()
    }

    pub async fn cancelled(&self) -> Vec<String> {
        self.cancelled.read().await.clone()
    }

    pub async fn set_next_error(&self, error: PredictionError) {
        *self.next_error.write().await = Some(error);
    }

    async fn take_error(&self) -> Result<(), PredictionError> {
        match self.next_error.write().await.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PredictionMarket for MockPredictionMarket {
    fn name(&self) -> &str {
        "mock"
    }

    async fn open(&self, request: &MarketRequest) -> Result<OpenedMarket, PredictionError> {
        self.take_error().await?;
        self.requests.write().await.push(request.clone());

        let mut counter = self.counter.write().await;
        *counter += 1;
        let market_id = format!("market-{}", *counter);
        let outcome_ids: HashMap<String, String> = request
            .outcomes
            .iter()
            .enumerate()
            .map(|(i, title)| (title.clone(), format!("{}-outcome-{}", market_id, i + 1)))
            .collect();

        let opened = OpenedMarket {
            market_id,
            outcome_ids,
        };
        self.opened.write().await.push(opened.clone());
        Ok(opened)
    }

    async fn resolve(&self, market_id: &str, winning_outcome_id: &str) -> Result<(), PredictionError> {
        self.take_error().await?;
        self.resolved
            .write()
            .await
            .push((market_id.to_string(), winning_outcome_id.to_string()));
        Ok(())
    }

    async fn cancel(&self, market_id: &str) -> Result<(), PredictionError> {
        self.take_error().await?;
        self.cancelled.write().await.push(market_id.to_string());
        Ok(())
    }
}
