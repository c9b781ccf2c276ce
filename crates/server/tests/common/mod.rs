//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with a live orchestrator task and mock dependencies injected, so the API
//! can be exercised without a race engine or a prediction market.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::{broadcast, watch};
use tower::ServiceExt;

use pitwall_core::{
    spawn_orchestrator, Config, DatabaseConfig, EngineConfig, OrchestratorConfig,
    PredictionMarket, PredictionResolver, PredictionSettings, RaceEngine, RaceOrchestrator,
    ServerConfig, StatsLedger, StatsStore, TelemetryConfig,
    testing::{MemoryStatsStore, MockPredictionMarket, MockRaceEngine},
};
use pitwall_server::api::{create_router, WsBroadcaster};
use pitwall_server::state::AppState;

/// Re-export fixtures for test convenience
#[allow(unused_imports)]
pub use pitwall_core::testing::fixtures;

/// Test fixture for E2E testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_join() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/race/join", json!({
///         "owner_id": "u1",
///         "name": "Ana"
///     })).await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
#[allow(dead_code)]
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock engine - inspect commands, inject failures
    pub engine: Arc<MockRaceEngine>,
    /// Mock prediction market
    pub market: Arc<MockPredictionMarket>,
    /// In-memory stats store
    pub stats: Arc<MemoryStatsStore>,
    /// Keeps the orchestrator task alive for the fixture's lifetime
    shutdown: broadcast::Sender<()>,
    /// Temporary directory (config paths point here)
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

#[allow(dead_code)]
impl TestFixture {
    /// Create a new test fixture with a small, fast orchestrator.
    pub async fn new() -> Self {
        Self::with_config(test_orchestrator_config()).await
    }

    /// Create a test fixture with custom orchestrator configuration.
    pub async fn with_config(orchestrator_config: OrchestratorConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let engine = Arc::new(MockRaceEngine::new());
        let market = Arc::new(MockPredictionMarket::new());
        let stats = Arc::new(MemoryStatsStore::new());

        let config = Config {
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
            },
            database: DatabaseConfig {
                path: temp_dir.path().join("stats.db"),
            },
            engine: EngineConfig {
                url: "http://127.0.0.1:1".to_string(),
                timeout_secs: 1,
            },
            telemetry: TelemetryConfig::default(),
            orchestrator: orchestrator_config.clone(),
            predictions: None,
        };

        let ledger = StatsLedger::new(Arc::clone(&stats) as Arc<dyn StatsStore>);
        let predictions = PredictionResolver::new(
            Some(Arc::clone(&market) as Arc<dyn PredictionMarket>),
            PredictionSettings::default(),
            Duration::from_secs(1),
        );
        let orchestrator = RaceOrchestrator::new(
            orchestrator_config,
            Arc::clone(&engine) as Arc<dyn RaceEngine>,
            ledger,
            predictions,
        )
        .with_seed(7);

        let (shutdown, _) = broadcast::channel(1);
        let (telemetry_tx, telemetry_rx) = watch::channel(None);
        let (handle, _task) = spawn_orchestrator(orchestrator, telemetry_rx, shutdown.subscribe());

        let state = Arc::new(AppState::new(
            config,
            handle,
            Arc::new(telemetry_tx),
            WsBroadcaster::default(),
        ));

        Self {
            router: create_router(state),
            engine,
            market,
            stats,
            shutdown,
            temp_dir,
        }
    }

    /// Stop the orchestrator task.
    pub fn stop_orchestrator(&self) {
        let _ = self.shutdown.send(());
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Get the raw text of a response (for non-JSON endpoints).
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Poll `/status` until `phase` matches, or panic after a second.
    pub async fn wait_for_phase(&self, phase: &str) -> Value {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        loop {
            let response = self.get("/api/v1/status").await;
            if response.body["phase"] == phase {
                return response.body;
            }
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "phase never reached {}, last status: {}",
                    phase, response.body
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Small field and short timers so tests reach each phase in a few ticks.
pub fn test_orchestrator_config() -> OrchestratorConfig {
    OrchestratorConfig {
        capacity: 3,
        entry_countdown_ticks: 5,
        start_countdown_ticks: 1,
        finish_hold_ticks: 1,
        fill_timeout_ticks: 3,
        command_timeout_ms: 500,
        ..Default::default()
    }
}
