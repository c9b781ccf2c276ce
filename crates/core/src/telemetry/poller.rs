//! Snapshot file poller.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::wire::{parse_snapshot, TelemetryError};
use super::TelemetrySnapshot;

/// Watches the engine's snapshot file and publishes each new snapshot.
///
/// Publishing goes through a `watch` channel, so a burst of writes between
/// two reads on the consumer side collapses to the latest snapshot. The
/// sender is shared with the HTTP ingest endpoint.
pub struct TelemetryPoller {
    path: PathBuf,
    interval: Duration,
    sender: Arc<watch::Sender<Option<TelemetrySnapshot>>>,
    last_modified: Option<SystemTime>,
}

impl TelemetryPoller {
    pub fn new(
        path: PathBuf,
        interval: Duration,
        sender: Arc<watch::Sender<Option<TelemetrySnapshot>>>,
    ) -> Self {
        Self {
            path,
            interval,
            sender,
            last_modified: None,
        }
    }

    /// Check the file once. Returns `Ok(true)` when a new snapshot was
    /// published.
    ///
    /// A file that fails to parse (typically caught mid-write) is not marked
    /// as seen, so it is retried on the next poll.
    pub async fn poll_once(&mut self) -> Result<bool, TelemetryError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| TelemetryError::Io(e.to_string()))?;
        let modified = metadata
            .modified()
            .map_err(|e| TelemetryError::Io(e.to_string()))?;

        if self.last_modified == Some(modified) {
            return Ok(false);
        }

        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| TelemetryError::Io(e.to_string()))?;
        let snapshot = parse_snapshot(&text, Utc::now())?;

        self.last_modified = Some(modified);
        self.sender.send_replace(Some(snapshot));
        Ok(true)
    }

    /// Poll until shutdown is signalled.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            "Telemetry poller watching {:?} every {:?}",
            self.path, self.interval
        );
        let mut missing_logged = false;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Telemetry poller shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {
                    match self.poll_once().await {
                        Ok(true) => {
                            missing_logged = false;
                            debug!("Published telemetry snapshot from {:?}", self.path);
                        }
                        Ok(false) => {}
                        Err(TelemetryError::Io(e)) => {
                            if !missing_logged {
                                warn!("Telemetry file unavailable: {}", e);
                                missing_logged = true;
                            }
                        }
                        Err(e) => debug!("Skipping unreadable snapshot: {}", e),
                    }
                }
            }
        }
    }
}
