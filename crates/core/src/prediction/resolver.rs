//! Maps the field of entrants onto market outcomes and settles the market.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::metrics::PREDICTIONS_TOTAL;

use super::{
    MarketRequest, PredictionError, PredictionMarket, PredictionSettings, PredictionState,
    FIELD_OUTCOME_TITLE, MAX_OUTCOME_TITLE_LEN,
};

/// How entrants are split between individual outcomes and the catch-all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutcomePlan {
    /// (entrant name, outcome title) for individually listed entrants.
    pub individual: Vec<(String, String)>,
    /// Entrants absorbed by the catch-all outcome.
    pub field: Vec<String>,
}

impl OutcomePlan {
    /// Outcome titles in display order, catch-all last.
    pub fn titles(&self) -> Vec<String> {
        let mut titles: Vec<String> = self.individual.iter().map(|(_, t)| t.clone()).collect();
        if !self.field.is_empty() {
            titles.push(FIELD_OUTCOME_TITLE.to_string());
        }
        titles
    }

    pub fn outcome_count(&self) -> usize {
        self.individual.len() + usize::from(!self.field.is_empty())
    }
}

fn truncate_title(name: &str, max_chars: usize) -> String {
    name.chars().take(max_chars).collect()
}

/// Pick up to `max_individual` entrants at random for their own outcome; the
/// rest share the catch-all outcome.
pub fn plan_outcomes<R: Rng + ?Sized>(
    names: &[String],
    max_individual: usize,
    rng: &mut R,
) -> OutcomePlan {
    let mut shuffled: Vec<String> = names.to_vec();
    shuffled.shuffle(rng);

    let split = shuffled.len().min(max_individual);
    let field = shuffled.split_off(split);

    let mut used_titles: Vec<String> = Vec::with_capacity(shuffled.len());
    let individual = shuffled
        .into_iter()
        .map(|name| {
            let mut title = truncate_title(&name, MAX_OUTCOME_TITLE_LEN);
            let mut n = 2;
            while used_titles.contains(&title) || title == FIELD_OUTCOME_TITLE {
                let suffix = format!(" #{}", n);
                title = truncate_title(&name, MAX_OUTCOME_TITLE_LEN - suffix.len()) + &suffix;
                n += 1;
            }
            used_titles.push(title.clone());
            (name, title)
        })
        .collect();

    OutcomePlan { individual, field }
}

/// What happened when the market was settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Resolution {
    /// No market was open.
    NotActive,
    Resolved { outcome: String },
    Cancelled { reason: String },
}

/// Owns the prediction state for the current race.
///
/// Resolving and cancelling always clear the state, whether or not the
/// external call succeeds.
pub struct PredictionResolver {
    market: Option<Arc<dyn PredictionMarket>>,
    settings: PredictionSettings,
    state: PredictionState,
    call_timeout: Duration,
}

impl PredictionResolver {
    pub fn new(
        market: Option<Arc<dyn PredictionMarket>>,
        settings: PredictionSettings,
        call_timeout: Duration,
    ) -> Self {
        Self {
            market,
            settings,
            state: PredictionState::default(),
            call_timeout,
        }
    }

    pub fn state(&self) -> &PredictionState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    pub fn enabled(&self) -> bool {
        self.settings.enabled && self.market.is_some()
    }

    /// Flip automatic market opening. Returns the new setting.
    pub fn toggle(&mut self) -> bool {
        self.settings.enabled = !self.settings.enabled;
        info!(
            "Predictions {}",
            if self.settings.enabled { "enabled" } else { "disabled" }
        );
        self.settings.enabled
    }

    async fn call<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, PredictionError>>,
    ) -> Result<T, PredictionError> {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(PredictionError::Timeout),
        }
    }

    /// Open a market for the given entrant names. Returns whether a market
    /// is now open.
    pub async fn open(&mut self, names: &[String]) -> bool {
        if self.state.active {
            debug!("Prediction already active, not opening another");
            return false;
        }
        let Some(market) = self.market.clone() else {
            return false;
        };
        if !self.settings.enabled {
            debug!("Predictions disabled, skipping");
            return false;
        }

        let plan = plan_outcomes(names, self.settings.max_outcomes, &mut rand::thread_rng());
        if plan.outcome_count() < 2 {
            info!(
                "Not opening prediction: {} outcome(s) for {} entrant(s)",
                plan.outcome_count(),
                names.len()
            );
            return false;
        }

        let request = MarketRequest {
            title: self.settings.title.clone(),
            outcomes: plan.titles(),
            window_secs: self.settings.window_secs,
        };

        match self.call(market.open(&request)).await {
            Ok(opened) => {
                info!(
                    "Opened prediction {} on {} with {} outcomes ({} in the field)",
                    opened.market_id,
                    market.name(),
                    request.outcomes.len(),
                    plan.field.len()
                );
                self.state = PredictionState {
                    active: true,
                    market_id: Some(opened.market_id),
                    outcome_ids: opened.outcome_ids,
                    tracked: plan.individual.into_iter().collect::<HashMap<_, _>>(),
                    field_members: plan.field,
                };
                PREDICTIONS_TOTAL.with_label_values(&["opened"]).inc();
                true
            }
            Err(e) => {
                error!("Failed to open prediction: {}", e);
                PREDICTIONS_TOTAL.with_label_values(&["open_failed"]).inc();
                false
            }
        }
    }

    /// Settle the open market for `winner`. A winner that maps to no outcome
    /// cancels the market instead.
    pub async fn resolve(&mut self, winner: Option<&str>) -> Resolution {
        if !self.state.active {
            return Resolution::NotActive;
        }
        let state = std::mem::take(&mut self.state);

        let outcome_title = winner.and_then(|w| {
            state.tracked.get(w).cloned().or_else(|| {
                state
                    .field_members
                    .iter()
                    .any(|m| m == w)
                    .then(|| FIELD_OUTCOME_TITLE.to_string())
            })
        });
        let target = outcome_title
            .as_ref()
            .and_then(|title| state.outcome_ids.get(title).map(|id| (title.clone(), id.clone())));

        let Some((title, outcome_id)) = target else {
            let reason = match winner {
                Some(w) => format!("winner {} has no outcome", w),
                None => "race finished without a winner".to_string(),
            };
            warn!("Cancelling prediction: {}", reason);
            self.cancel_market(&state).await;
            return Resolution::Cancelled { reason };
        };

        let (Some(market), Some(market_id)) = (self.market.clone(), state.market_id.as_deref()) else {
            return Resolution::Cancelled {
                reason: "no market id".to_string(),
            };
        };

        match self.call(market.resolve(market_id, &outcome_id)).await {
            Ok(()) => {
                info!("Resolved prediction {} for outcome {}", market_id, title);
                PREDICTIONS_TOTAL.with_label_values(&["resolved"]).inc();
            }
            Err(e) => {
                error!("Failed to resolve prediction {}: {}", market_id, e);
                PREDICTIONS_TOTAL.with_label_values(&["resolve_failed"]).inc();
            }
        }
        Resolution::Resolved { outcome: title }
    }

    /// Cancel (refund) the open market. Returns false when nothing was open,
    /// so repeated calls never cancel twice.
    pub async fn cancel(&mut self, reason: &str) -> bool {
        if !self.state.active {
            return false;
        }
        let state = std::mem::take(&mut self.state);
        info!("Cancelling prediction: {}", reason);
        self.cancel_market(&state).await;
        true
    }

    async fn cancel_market(&self, state: &PredictionState) {
        let (Some(market), Some(market_id)) = (self.market.clone(), state.market_id.as_deref()) else {
            return;
        };
        match self.call(market.cancel(market_id)).await {
            Ok(()) => {
                PREDICTIONS_TOTAL.with_label_values(&["cancelled"]).inc();
            }
            Err(e) => {
                error!("Failed to cancel prediction {}: {}", market_id, e);
                PREDICTIONS_TOTAL.with_label_values(&["cancel_failed"]).inc();
            }
        }
    }
}
