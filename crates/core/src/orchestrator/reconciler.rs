//! Keeps the engine's field in line with the roster.
//!
//! An entrant missing from telemetry is respawned unless it was seen within
//! the grace period or a spawn was sent within the cooldown. Corrective spawns
//! go straight to the engine: they are idempotent and never give up, so they
//! bypass the command queue and its abandonment policy.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::metrics::CORRECTIVE_SPAWNS;

use super::session::RaceSession;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Reconciliation was skipped because a bulk delete is in flight.
    pub suspended: bool,
    /// Entrants a corrective spawn was sent for.
    pub respawned: Vec<String>,
}

pub struct RosterReconciler {
    grace_period: Duration,
    cooldown: Duration,
}

impl RosterReconciler {
    pub fn new(grace_period: Duration, cooldown: Duration) -> Self {
        Self {
            grace_period,
            cooldown,
        }
    }

    /// Compare the roster against the ids seen in the latest snapshot.
    pub async fn reconcile(
        &self,
        session: &mut RaceSession,
        observed: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> ReconcileReport {
        if session.deleting {
            return ReconcileReport {
                suspended: true,
                respawned: Vec::new(),
            };
        }

        let mut missing = Vec::new();
        for entrant in &session.roster {
            if observed.contains(&entrant.owner_id) {
                continue;
            }
            missing.push(entrant.clone());
        }
        for id in observed {
            if session.is_entered(id) {
                session.confirmed_spawns.insert(id.clone(), now);
                session.pending_spawns.remove(id);
            }
        }

        let mut report = ReconcileReport::default();
        for entrant in missing {
            let id = &entrant.owner_id;
            if let Some(seen) = session.confirmed_spawns.get(id) {
                if now - *seen < self.grace_period {
                    continue;
                }
            }
            if let Some(sent) = session.pending_spawns.get(id) {
                if now - *sent < self.cooldown {
                    continue;
                }
            }

            info!("Respawning {} ({}): missing from telemetry", entrant.name, id);
            let request = entrant.spawn_request();
            let engine = session.engine.clone();
            if let Err(e) = session
                .call_engine("spawn_participant", engine.spawn_participant(&request))
                .await
            {
                warn!("Corrective spawn for {} failed: {}", id, e);
            }
            // Cooldown applies whether or not the call went through.
            session.pending_spawns.insert(id.clone(), now);
            CORRECTIVE_SPAWNS.inc();
            report.respawned.push(id.clone());
        }
        report
    }
}
