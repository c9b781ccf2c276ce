//! Race engine command channel.
//!
//! The orchestrator drives the simulation through the [`RaceEngine`] trait;
//! [`HttpRaceEngine`] talks to the engine's HTTP command bridge.

mod http;
mod types;

pub use http::HttpRaceEngine;
pub use types::*;
