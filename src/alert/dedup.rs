//! Alert deduplication.
//!
//! Classifies a reading, then for every abnormal metric decides whether its
//! `(metric, severity)` key is outside the cooldown window, builds the
//! `AlertEvent` and dispatches it. The cooldown is recorded only after the
//! sink accepted the notification, so a failed delivery leaves the key
//! eligible for the next abnormal reading.
//!
//! The whole check → dispatch → record sequence runs under one lock: two
//! callers (periodic tick and manual refresh) can never both pass the
//! cooldown check for the same key.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::alert::classifier::{Classification, classify};
use crate::alert::cooldown::CooldownRegistry;
use crate::alert::dispatch::Dispatcher;
use crate::alert::thresholds::{Assessment, ThresholdStore};
use crate::logging::{self, Component};
use crate::model::{AlertEvent, AlertKey, Deviation, DispatchError, Metric, Severity, VitalReading};

/// Everything that happened while processing one reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub classification: Classification,
    /// Events the sink accepted, in metric order.
    pub fired: Vec<AlertEvent>,
    /// Keys skipped because they are still cooling down.
    pub suppressed: Vec<AlertKey>,
    /// Keys whose dispatch failed; their cooldown was not consumed.
    pub failed: Vec<(AlertKey, DispatchError)>,
}

pub struct Deduplicator {
    thresholds: Arc<ThresholdStore>,
    registry: Mutex<CooldownRegistry>,
    dispatcher: Dispatcher,
    subject_id: Option<String>,
}

impl Deduplicator {
    pub fn new(
        thresholds: Arc<ThresholdStore>,
        registry: CooldownRegistry,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            thresholds,
            registry: Mutex::new(registry),
            dispatcher,
            subject_id: None,
        }
    }

    pub fn with_subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    /// Single serialized entry point: classify, dedupe and dispatch.
    pub fn process(&self, reading: &VitalReading, now: DateTime<Utc>) -> Evaluation {
        let table = self.thresholds.snapshot();
        let classification = classify(reading, &table);
        let subject = self.subject_id.as_deref();

        if classification.overall.is_abnormal() {
            logging::debug(
                Component::Classifier,
                subject,
                &format!("Reading classified {} overall", classification.overall),
            );
        }

        let mut fired = Vec::new();
        let mut suppressed = Vec::new();
        let mut failed = Vec::new();

        let mut registry = self.lock_registry();
        let cooldown = registry.cooldown();

        for (metric, assessment) in classification.abnormal() {
            let key = AlertKey::new(metric, assessment.severity);

            if !registry.should_fire(key, now, cooldown) {
                logging::debug(
                    Component::Cooldown,
                    subject,
                    &format!("Suppressed {} (cooling down)", key),
                );
                suppressed.push(key);
                continue;
            }

            let event = build_event(metric, assessment, reading);
            match self.dispatcher.dispatch(&event) {
                Ok(_) => {
                    registry.record_fired(key, now);
                    fired.push(event);
                }
                Err(e) => failed.push((key, e)),
            }
        }

        Evaluation { classification, fired, suppressed, failed }
    }

    /// Read-only cooldown check for `key` against the configured window.
    pub fn should_fire(&self, key: AlertKey, now: DateTime<Utc>) -> bool {
        self.lock_registry().is_eligible(key, now)
    }

    pub fn last_fired(&self, key: AlertKey) -> Option<DateTime<Utc>> {
        self.lock_registry().last_fired(key)
    }

    pub fn cooldown(&self) -> Duration {
        self.lock_registry().cooldown()
    }

    pub fn set_cooldown(&self, cooldown: Duration) {
        self.lock_registry().set_cooldown(cooldown);
        logging::info(
            Component::Cooldown,
            self.subject_id.as_deref(),
            &format!("Cooldown set to {}s", cooldown.as_secs()),
        );
    }

    pub fn clear_history(&self) {
        self.lock_registry().clear_history();
        logging::info(Component::Cooldown, self.subject_id.as_deref(), "Alert history cleared");
    }

    pub fn thresholds(&self) -> &Arc<ThresholdStore> {
        &self.thresholds
    }

    fn lock_registry(&self) -> MutexGuard<'_, CooldownRegistry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Event construction
// ---------------------------------------------------------------------------

fn build_event(metric: Metric, assessment: Assessment, reading: &VitalReading) -> AlertEvent {
    let title = match assessment.severity {
        Severity::Critical => format!("CRITICAL ALERT - {}", metric.label()),
        _ => format!("Attention - {}", metric.label()),
    };
    AlertEvent {
        metric,
        severity: assessment.severity,
        title,
        message: alert_message(metric, assessment.severity, assessment.deviation).to_string(),
        value: metric.format_value(reading.value(metric)),
        requires_vibration: true,
    }
}

fn alert_message(metric: Metric, severity: Severity, deviation: Option<Deviation>) -> &'static str {
    let high = deviation == Some(Deviation::High);
    let critical = severity == Severity::Critical;
    match (metric, critical, high) {
        (Metric::Temperature, true, true) => "High fever detected!",
        (Metric::Temperature, true, false) => "Temperature very low!",
        (Metric::Temperature, false, true) => "Elevated temperature",
        (Metric::Temperature, false, false) => "Low temperature",
        (Metric::HeartRate, true, true) => "Severe tachycardia!",
        (Metric::HeartRate, true, false) => "Severe bradycardia!",
        (Metric::HeartRate, false, true) => "Fast heartbeat",
        (Metric::HeartRate, false, false) => "Slow heartbeat",
        (Metric::RespiratoryRate, true, true) => "Breathing very fast!",
        (Metric::RespiratoryRate, true, false) => "Breathing very slow!",
        (Metric::RespiratoryRate, false, true) => "Fast breathing",
        (Metric::RespiratoryRate, false, false) => "Slow breathing",
        (Metric::OxygenSaturation, true, false) => {
            "Critical saturation! Seek medical help immediately!"
        }
        (Metric::OxygenSaturation, false, false) => "Low saturation - monitor closely",
        (Metric::OxygenSaturation, _, true) => "Oxygen saturation above configured range",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
