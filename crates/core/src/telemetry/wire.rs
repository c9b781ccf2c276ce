//! Decoding of the engine's raw snapshot JSON.
//!
//! The engine writes loosely typed JSON: ids arrive as numbers or strings,
//! booleans as `"true"`, lap times as float seconds with `0.0` meaning unset,
//! and lists are sometimes `null`. Decoding is tolerant of all of these and
//! skips malformed list entries instead of rejecting the whole snapshot.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::{FinishEntry, ParticipantTelemetry, TelemetrySnapshot};
use crate::engine::RaceStatus;
use crate::stats::LapTime;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid snapshot JSON: {0}")]
    InvalidJson(String),

    #[error("Snapshot read failed: {0}")]
    Io(String),
}

#[derive(Debug, Default, Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    md: Option<RawMeta>,
    #[serde(default)]
    rt: Value,
    #[serde(default)]
    fd: Value,
}

#[derive(Debug, Default, Deserialize)]
struct RawMeta {
    #[serde(default)]
    status: Value,
    #[serde(default, rename = "lapsLeft")]
    laps_left: Value,
    #[serde(default)]
    qualifying: Value,
}

#[derive(Debug, Default, Deserialize)]
struct RawRealtime {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    uid: Value,
    #[serde(default)]
    userid: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    place: Value,
    #[serde(default)]
    lap: Value,
    #[serde(default, rename = "lastLap")]
    last_lap: Value,
    #[serde(default, rename = "bestLap")]
    best_lap: Value,
    #[serde(default)]
    finished: Value,
}

#[derive(Debug, Default, Deserialize)]
struct RawFinish {
    #[serde(default)]
    racer_id: Value,
    #[serde(default)]
    uid: Value,
    #[serde(default)]
    userid: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    position: Value,
    #[serde(default)]
    best_lap: Value,
}

/// Parse snapshot text as written by the engine.
pub fn parse_snapshot(text: &str, received_at: DateTime<Utc>) -> Result<TelemetrySnapshot, TelemetryError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| TelemetryError::InvalidJson(e.to_string()))?;
    decode_snapshot(value, received_at)
}

/// Decode an already-parsed snapshot document.
pub fn decode_snapshot(value: Value, received_at: DateTime<Utc>) -> Result<TelemetrySnapshot, TelemetryError> {
    if !value.is_object() {
        return Err(TelemetryError::InvalidJson(
            "snapshot must be a JSON object".to_string(),
        ));
    }
    let raw: RawSnapshot =
        serde_json::from_value(value).map_err(|e| TelemetryError::InvalidJson(e.to_string()))?;
    let meta = raw.md.unwrap_or_default();

    let mut seen = HashSet::new();
    let participants = entries::<RawRealtime>(raw.rt)
        .into_iter()
        .filter_map(|r| {
            let owner_id = id_string(&r.uid)
                .or_else(|| id_string(&r.userid))
                .or_else(|| id_string(&r.id))?;
            if !seen.insert(owner_id.clone()) {
                return None;
            }
            Some(ParticipantTelemetry {
                name: r.name.unwrap_or_else(|| owner_id.clone()),
                owner_id,
                place: as_u32(&r.place).unwrap_or(0),
                lap: as_u32(&r.lap).unwrap_or(0),
                last_lap: as_f64(&r.last_lap).and_then(LapTime::from_seconds),
                best_lap: as_f64(&r.best_lap).and_then(LapTime::from_seconds),
                finished: as_bool(&r.finished),
            })
        })
        .collect();

    let finishers = entries::<RawFinish>(raw.fd)
        .into_iter()
        .filter_map(|f| {
            let owner_id = id_string(&f.uid)
                .or_else(|| id_string(&f.userid))
                .or_else(|| id_string(&f.racer_id))?;
            Some(FinishEntry {
                name: f.name.unwrap_or_else(|| owner_id.clone()),
                owner_id,
                place: as_u32(&f.position).filter(|p| *p > 0),
                best_lap: as_f64(&f.best_lap).and_then(LapTime::from_seconds),
            })
        })
        .collect();

    Ok(TelemetrySnapshot {
        status: as_f64(&meta.status)
            .map(|code| RaceStatus::from_code(code as i64))
            .unwrap_or_default(),
        laps_remaining: as_f64(&meta.laps_left).map(|l| l as i32).unwrap_or(0),
        qualifying: as_bool(&meta.qualifying),
        participants,
        finishers,
        received_at,
    })
}

/// Decode list entries, treating non-lists as empty and skipping bad items.
fn entries<T: for<'de> Deserialize<'de>>(value: Value) -> Vec<T> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i.to_string()),
            None => n.as_f64().map(|f| {
                if f.fract() == 0.0 {
                    (f as i64).to_string()
                } else {
                    f.to_string()
                }
            }),
        },
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    as_f64(value).filter(|v| *v >= 0.0).map(|v| v as u32)
}

fn as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_i64().is_some_and(|i| i != 0),
        _ => false,
    }
}
