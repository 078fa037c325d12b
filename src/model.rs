//! Core data types for the vital-sign monitoring service.
//!
//! This module defines the shared domain model imported by all other modules:
//! metrics, readings, severities, alert keys and events, plus the error
//! types. It contains no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// One monitored physiological quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    Temperature,
    HeartRate,
    RespiratoryRate,
    OxygenSaturation,
}

impl Metric {
    /// All metrics, in the order they are evaluated and reported.
    pub const ALL: [Metric; 4] = [
        Metric::Temperature,
        Metric::HeartRate,
        Metric::RespiratoryRate,
        Metric::OxygenSaturation,
    ];

    /// Canonical wire/config name.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::HeartRate => "heartRate",
            Metric::RespiratoryRate => "respiratoryRate",
            Metric::OxygenSaturation => "oxygenSaturation",
        }
    }

    /// Localized field name used by the sensor firmware.
    pub fn localized_name(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperatura",
            Metric::HeartRate => "batimentos",
            Metric::RespiratoryRate => "respiracao",
            Metric::OxygenSaturation => "saturacao",
        }
    }

    /// Human-readable label used in notification titles.
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Temperature => "Temperature",
            Metric::HeartRate => "Heart Rate",
            Metric::RespiratoryRate => "Respiratory Rate",
            Metric::OxygenSaturation => "Oxygen Saturation",
        }
    }

    /// Looks a metric up by canonical, localized or snake_case name.
    pub fn from_name(name: &str) -> Option<Metric> {
        let trimmed = name.trim();
        Metric::ALL.into_iter().find(|m| {
            trimmed.eq_ignore_ascii_case(m.canonical_name())
                || trimmed.eq_ignore_ascii_case(m.localized_name())
                || trimmed.eq_ignore_ascii_case(m.snake_name())
        })
    }

    fn snake_name(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::HeartRate => "heart_rate",
            Metric::RespiratoryRate => "respiratory_rate",
            Metric::OxygenSaturation => "oxygen_saturation",
        }
    }

    /// Formats a value with this metric's unit, e.g. `38.6°C` or `130 bpm`.
    pub fn format_value(&self, value: f64) -> String {
        match self {
            Metric::Temperature => format!("{:.1}°C", value),
            Metric::HeartRate => format!("{} bpm", value.round() as i64),
            Metric::RespiratoryRate => format!("{} rpm", value.round() as i64),
            Metric::OxygenSaturation => format!("{}%", value.round() as i64),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// Movement state reported by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementState {
    Active,
    Sleeping,
    Restless,
}

impl MovementState {
    /// Parses canonical or localized movement values, case-insensitive.
    pub fn parse(raw: &str) -> Option<MovementState> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" | "ativo" => Some(MovementState::Active),
            "sleeping" | "dormindo" => Some(MovementState::Sleeping),
            "restless" | "agitado" => Some(MovementState::Restless),
            _ => None,
        }
    }
}

/// A single sampled observation from the sensor.
///
/// Built by `ingest::normalize` from a raw payload; never mutated after
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalReading {
    pub temperature_c: f64,
    pub heart_rate_bpm: u32,
    pub respiratory_rate_rpm: u32,
    pub oxygen_saturation_pct: u32,
    pub movement: MovementState,
    pub observed_at: DateTime<Utc>,
}

impl VitalReading {
    /// Numeric value of one metric, widened to `f64` for band comparison.
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Temperature => self.temperature_c,
            Metric::HeartRate => f64::from(self.heart_rate_bpm),
            Metric::RespiratoryRate => f64::from(self.respiratory_rate_rpm),
            Metric::OxygenSaturation => f64::from(self.oxygen_saturation_pct),
        }
    }
}

// ---------------------------------------------------------------------------
// Severity and alerts
// ---------------------------------------------------------------------------

/// Classification of one metric or a whole reading, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Attention,
    Critical,
}

impl Severity {
    pub fn is_abnormal(&self) -> bool {
        *self != Severity::Normal
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Normal => write!(f, "normal"),
            Severity::Attention => write!(f, "attention"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Which side of the normal range an abnormal value falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Deviation {
    Low,
    High,
}

/// Deduplication unit: a class of recurring alert, not an instance of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlertKey {
    pub metric: Metric,
    pub severity: Severity,
}

impl AlertKey {
    pub fn new(metric: Metric, severity: Severity) -> Self {
        Self { metric, severity }
    }
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.metric, self.severity)
    }
}

/// A decided, dispatch-ready alert. Consumed once by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub metric: Metric,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    /// Value formatted with its unit, e.g. `38.6°C`.
    pub value: String,
    pub requires_vibration: bool,
}

impl AlertEvent {
    pub fn key(&self) -> AlertKey {
        AlertKey::new(self.metric, self.severity)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise when fetching or normalizing a sensor payload.
///
/// Always recovered inside the acquisition loop: the tick is skipped and the
/// connection is marked disconnected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AcquisitionError {
    /// The request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,
    /// Non-2xx HTTP response from the sensor endpoint.
    #[error("HTTP error: {0}")]
    Http(u16),
    /// Connection refused, DNS failure, reset, etc.
    #[error("Transport error: {0}")]
    Transport(String),
    /// The body was not a usable sensor payload.
    #[error("Malformed payload: {0}")]
    Malformed(String),
}

/// Threshold table misconfiguration. Surfaced to whoever supplied the table.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThresholdError {
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),
    #[error("No threshold band registered for metric: {0}")]
    MissingMetric(Metric),
    #[error("Invalid band for {metric}: {reason}")]
    InvalidBand { metric: Metric, reason: String },
}

/// The notification sink failed to deliver an alert.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    /// The sink was reachable but refused the notification.
    #[error("Notification rejected: {0}")]
    Rejected(String),
    /// The sink could not be reached.
    #[error("Notification transport failed: {0}")]
    Transport(String),
}
