//! Mock race engine for testing.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::engine::{EngineError, RaceEngine, RaceStatus, SpawnRequest};

/// A recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    SetRaceStatus(RaceStatus),
    DeleteAll,
    Spawn(SpawnRequest),
    Remove(String),
    ResetControl,
}

/// Mock implementation of the RaceEngine trait.
///
/// Every call is recorded, including calls that then fail, so tests can
/// count attempts.
///
/// # Example
///
/// ```rust,ignore
/// let engine = MockRaceEngine::new();
/// engine.set_next_error(EngineError::Timeout).await;
///
/// assert!(engine.reset_control().await.is_err());
/// assert!(engine.reset_control().await.is_ok());
/// assert_eq!(engine.calls().await.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct MockRaceEngine {
    calls: Arc<RwLock<Vec<EngineCall>>>,
    /// If set, the next call fails with this error.
    next_error: Arc<RwLock<Option<EngineError>>>,
    /// Artificial latency applied to every call.
    delay: Arc<RwLock<Option<Duration>>>,
}

impl MockRaceEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded calls, oldest first.
    pub async fn calls(&self) -> Vec<EngineCall> {
        self.calls.read().await.clone()
    }

    /// Spawn requests only.
    pub async fn spawn_calls(&self) -> Vec<SpawnRequest> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|c| match c {
                EngineCall::Spawn(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.calls.write().await.clear();
    }

    pub async fn set_next_error(&self, error: EngineError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    async fn handle(&self, call: EngineCall) -> Result<(), EngineError> {
        self.calls.write().await.push(call);
        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.next_error.write().await.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RaceEngine for MockRaceEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn set_race_status(&self, status: RaceStatus) -> Result<(), EngineError> {
        self.handle(EngineCall::SetRaceStatus(status)).await
    }

    async fn delete_all_participants(&self) -> Result<(), EngineError> {
        self.handle(EngineCall::DeleteAll).await
    }

    async fn spawn_participant(&self, request: &SpawnRequest) -> Result<(), EngineError> {
        self.handle(EngineCall::Spawn(request.clone())).await
    }

    async fn remove_participant(&self, owner_id: &str) -> Result<(), EngineError> {
        self.handle(EngineCall::Remove(owner_id.to_string())).await
    }

    async fn reset_control(&self) -> Result<(), EngineError> {
        self.handle(EngineCall::ResetControl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_failed_calls() {
        let engine = MockRaceEngine::new();
        engine.set_next_error(EngineError::Timeout).await;

        assert!(engine.reset_control().await.is_err());
        assert!(engine.remove_participant("a").await.is_ok());

        assert_eq!(
            engine.calls().await,
            vec![EngineCall::ResetControl, EngineCall::Remove("a".to_string())]
        );
    }
}
