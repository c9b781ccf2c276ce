//! Stats domain types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Three-slot vehicle color set (primary, secondary, accent).
pub type ColorSet = [String; 3];

/// A lap duration with millisecond precision.
///
/// Ordered numerically; rendered as `MM:SS.mmm` only for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LapTime(u64);

impl LapTime {
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Convert engine-reported seconds. Zero, negative and non-finite values
    /// mean "no lap set" and yield `None`.
    pub fn from_seconds(seconds: f64) -> Option<Self> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return None;
        }
        Some(Self((seconds * 1000.0).round() as u64))
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LapTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let minutes = self.0 / 60_000;
        let seconds = (self.0 % 60_000) / 1000;
        let millis = self.0 % 1000;
        write!(f, "{:02}:{:02}.{:03}", minutes, seconds, millis)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid lap time: {0}")]
pub struct LapTimeParseError(String);

impl FromStr for LapTime {
    type Err = LapTimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || LapTimeParseError(s.to_string());
        let (minutes, rest) = s.trim().split_once(':').ok_or_else(err)?;
        let (seconds, millis) = rest.split_once('.').unwrap_or((rest, "0"));

        let minutes: u64 = minutes.parse().map_err(|_| err())?;
        let seconds: u64 = seconds.parse().map_err(|_| err())?;
        if seconds >= 60 || millis.is_empty() || millis.len() > 3 {
            return Err(err());
        }
        // "5" after the dot is 500ms, not 5ms
        let millis: u64 = format!("{:0<3}", millis).parse().map_err(|_| err())?;

        Ok(Self(minutes * 60_000 + seconds * 1000 + millis))
    }
}

/// Persisted season record for one participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantStats {
    pub name: String,
    pub races_entered: u32,
    pub wins: u32,
    pub podiums: u32,
    pub points: u32,
    pub best_lap: Option<LapTime>,
    /// Last saved vehicle body type.
    pub saved_body: Option<String>,
    /// Last saved vehicle colors.
    pub saved_colors: Option<ColorSet>,
}

impl ParticipantStats {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Saved vehicle configuration, if both parts are present.
    pub fn saved_car(&self) -> Option<(&str, &ColorSet)> {
        match (&self.saved_body, &self.saved_colors) {
            (Some(body), Some(colors)) => Some((body.as_str(), colors)),
            _ => None,
        }
    }
}
