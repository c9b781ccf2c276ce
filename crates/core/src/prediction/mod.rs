//! Audience prediction market tied to the race winner.

mod resolver;
mod twitch;
mod types;

pub use resolver::{plan_outcomes, OutcomePlan, PredictionResolver, Resolution};
pub use twitch::TwitchPredictionClient;
pub use types::*;
