//! Tolerant payload normalization.
//!
//! The sensor firmware has shipped with both canonical (`temperature`,
//! `heartRate`, ...) and localized (`temperatura`, `batimentos`, ...) field
//! names, sometimes wrapped in a `{ success, data, message }` envelope, and
//! with numbers encoded as strings. This module turns any of those shapes
//! into a `VitalReading`.
//!
//! Per-field fallback order: localized key, canonical key, last-known-good
//! reading, documented default. A payload carrying none of the known fields
//! is rejected outright rather than turned into an all-defaults reading.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::model::{AcquisitionError, Metric, MovementState, VitalReading};

// ---------------------------------------------------------------------------
// Documented defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_TEMPERATURE_C: f64 = 36.8;
pub const DEFAULT_HEART_RATE_BPM: u32 = 120;
pub const DEFAULT_RESPIRATORY_RATE_RPM: u32 = 35;
pub const DEFAULT_OXYGEN_SATURATION_PCT: u32 = 98;
pub const DEFAULT_MOVEMENT: MovementState = MovementState::Sleeping;

const MOVEMENT_KEYS: [&str; 2] = ["movimento", "movement"];

/// A reading plus the names of fields that had to be filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub reading: VitalReading,
    pub defaulted: Vec<&'static str>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Builds a reading from a raw payload.
///
/// `last_good` supplies values for absent or unparsable fields before the
/// documented defaults are used.
pub fn normalize(
    payload: &Value,
    last_good: Option<&VitalReading>,
    observed_at: DateTime<Utc>,
) -> Result<Normalized, AcquisitionError> {
    let fields = sensor_fields(payload)?;

    if present_fields(fields).is_empty() {
        return Err(AcquisitionError::Malformed(
            "payload contains no sensor fields".to_string(),
        ));
    }

    let mut defaulted = Vec::new();

    let temperature_c = match lookup_number(fields, Metric::Temperature) {
        Some(v) => v,
        None => {
            defaulted.push(Metric::Temperature.canonical_name());
            last_good.map_or(DEFAULT_TEMPERATURE_C, |r| r.temperature_c)
        }
    };

    let mut count_field = |metric: Metric, previous: Option<u32>, default: u32| {
        match lookup_number(fields, metric).and_then(to_count) {
            Some(v) => v,
            None => {
                defaulted.push(metric.canonical_name());
                previous.unwrap_or(default)
            }
        }
    };

    let heart_rate_bpm = count_field(
        Metric::HeartRate,
        last_good.map(|r| r.heart_rate_bpm),
        DEFAULT_HEART_RATE_BPM,
    );
    let respiratory_rate_rpm = count_field(
        Metric::RespiratoryRate,
        last_good.map(|r| r.respiratory_rate_rpm),
        DEFAULT_RESPIRATORY_RATE_RPM,
    );
    let oxygen_saturation_pct = count_field(
        Metric::OxygenSaturation,
        last_good.map(|r| r.oxygen_saturation_pct),
        DEFAULT_OXYGEN_SATURATION_PCT,
    );

    let movement = match lookup_movement(fields) {
        Some(m) => m,
        None => {
            defaulted.push("movement");
            last_good.map_or(DEFAULT_MOVEMENT, |r| r.movement)
        }
    };

    Ok(Normalized {
        reading: VitalReading {
            temperature_c,
            heart_rate_bpm,
            respiratory_rate_rpm,
            oxygen_saturation_pct,
            movement,
            observed_at,
        },
        defaulted,
    })
}

/// Unwraps the optional response envelope and returns the sensor object.
pub fn sensor_fields(payload: &Value) -> Result<&Map<String, Value>, AcquisitionError> {
    let object = payload.as_object().ok_or_else(|| {
        AcquisitionError::Malformed(format!("expected a JSON object, got {}", kind(payload)))
    })?;

    if object.get("success").and_then(Value::as_bool) == Some(false) {
        let message = object
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("sensor reported failure");
        return Err(AcquisitionError::Malformed(message.to_string()));
    }

    match object.get("data") {
        Some(Value::Object(inner)) => Ok(inner),
        _ => Ok(object),
    }
}

/// Names of the known sensor keys (either spelling) present in `fields`.
pub fn present_fields(fields: &Map<String, Value>) -> Vec<&'static str> {
    let mut present = Vec::new();
    for metric in Metric::ALL {
        for key in [metric.localized_name(), metric.canonical_name()] {
            if fields.contains_key(key) {
                present.push(key);
            }
        }
    }
    for key in MOVEMENT_KEYS {
        if fields.contains_key(key) {
            present.push(key);
        }
    }
    present
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn lookup_number(fields: &Map<String, Value>, metric: Metric) -> Option<f64> {
    [metric.localized_name(), metric.canonical_name()]
        .into_iter()
        .filter_map(|key| fields.get(key))
        .find_map(as_number)
}

fn lookup_movement(fields: &Map<String, Value>) -> Option<MovementState> {
    MOVEMENT_KEYS
        .into_iter()
        .filter_map(|key| fields.get(key))
        .filter_map(Value::as_str)
        .find_map(MovementState::parse)
}

fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// Integer metrics are truncated, matching the firmware's own rounding.
fn to_count(value: f64) -> Option<u32> {
    if value < 0.0 || value > f64::from(u32::MAX) {
        return None;
    }
    Some(value.trunc() as u32)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
