use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pitwall_core::{
    load_config, spawn_orchestrator, validate_config, HttpRaceEngine, PredictionMarket,
    PredictionResolver, PredictionSettings, RaceEngine, RaceOrchestrator, SqliteStatsStore,
    StatsLedger, StatsStore, TelemetryPoller, TwitchPredictionClient,
};

use pitwall_server::api::{create_router, forward_overlay, WsBroadcaster};
use pitwall_server::state::AppState;

/// Used when no prediction section is configured; the resolver stays idle.
const DEFAULT_PREDICTION_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("PITWALL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    // Stats ledger
    let stats_store: Arc<dyn StatsStore> = Arc::new(
        SqliteStatsStore::new(&config.database.path).context("Failed to create stats store")?,
    );
    let ledger = StatsLedger::new(stats_store);
    info!(
        "Stats ledger loaded ({} season entrants)",
        ledger.season_entrants()
    );

    // Race engine
    let engine: Arc<dyn RaceEngine> = Arc::new(
        HttpRaceEngine::new(config.engine.clone()).context("Failed to create engine client")?,
    );
    info!("Race engine bridge at {}", config.engine.url);

    // Prediction market
    let predictions = match &config.predictions {
        Some(prediction_config) => {
            let market: Option<Arc<dyn PredictionMarket>> =
                match TwitchPredictionClient::new(prediction_config.clone()) {
                    Ok(client) => {
                        info!("Prediction market: {}", client.name());
                        Some(Arc::new(client))
                    }
                    Err(e) => {
                        warn!("Predictions disabled, failed to create client: {}", e);
                        None
                    }
                };
            PredictionResolver::new(
                market,
                prediction_config.settings(),
                Duration::from_secs(u64::from(prediction_config.timeout_secs)),
            )
        }
        None => {
            info!("No prediction market configured");
            PredictionResolver::new(
                None,
                PredictionSettings {
                    enabled: false,
                    ..Default::default()
                },
                DEFAULT_PREDICTION_TIMEOUT,
            )
        }
    };

    let orchestrator =
        RaceOrchestrator::new(config.orchestrator.clone(), engine, ledger, predictions);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (telemetry_tx, telemetry_rx) = watch::channel(None);
    let telemetry_tx = Arc::new(telemetry_tx);

    // Telemetry file poller
    let poller_task = match &config.telemetry.file {
        Some(path) => {
            info!("Polling telemetry from {:?}", path);
            let poller = TelemetryPoller::new(
                path.clone(),
                Duration::from_millis(config.telemetry.poll_interval_ms),
                Arc::clone(&telemetry_tx),
            );
            Some(tokio::spawn(poller.run(shutdown_tx.subscribe())))
        }
        None => {
            info!("No telemetry file configured, accepting pushes only");
            None
        }
    };

    let (handle, orchestrator_task) =
        spawn_orchestrator(orchestrator, telemetry_rx, shutdown_tx.subscribe());
    info!("Race orchestrator started");

    // Overlay updates to WebSocket clients
    let ws_broadcaster = WsBroadcaster::default();
    let forwarder_task = tokio::spawn(forward_overlay(
        handle.subscribe_overlay(),
        ws_broadcaster.clone(),
        shutdown_tx.subscribe(),
    ));

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        handle,
        telemetry_tx,
        ws_broadcaster,
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    let _ = shutdown_tx.send(());

    if let Err(e) = orchestrator_task.await {
        error!("Orchestrator task failed: {}", e);
    }
    let _ = forwarder_task.await;
    if let Some(task) = poller_task {
        let _ = task.await;
    }
    info!("Orchestrator stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
