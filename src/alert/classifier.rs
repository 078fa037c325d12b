//! Per-metric severity classification.
//!
//! Pure and deterministic: a reading plus a threshold table in, a
//! `Classification` out. No I/O, no clock.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::alert::thresholds::{Assessment, ThresholdTable};
use crate::model::{Metric, Severity, VitalReading};

/// Severity of each metric in a reading, plus the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub metrics: BTreeMap<Metric, Assessment>,
    /// Maximum of the per-metric severities.
    pub overall: Severity,
}

impl Classification {
    pub fn severity(&self, metric: Metric) -> Severity {
        self.assessment(metric).severity
    }

    pub fn assessment(&self, metric: Metric) -> Assessment {
        self.metrics.get(&metric).copied().unwrap_or_else(Assessment::normal)
    }

    /// Metrics at attention or critical, in evaluation order.
    pub fn abnormal(&self) -> impl Iterator<Item = (Metric, Assessment)> + '_ {
        self.metrics
            .iter()
            .filter(|(_, a)| a.severity.is_abnormal())
            .map(|(m, a)| (*m, *a))
    }
}

/// Classifies every metric of `reading` against `table`.
pub fn classify(reading: &VitalReading, table: &ThresholdTable) -> Classification {
    let metrics: BTreeMap<Metric, Assessment> = Metric::ALL
        .into_iter()
        .map(|metric| {
            // Tables are validated complete at construction, so the lookup
            // only misses for a table built outside `ThresholdTable::new`.
            let assessment = table
                .bands_for(metric)
                .map(|band| band.assess(reading.value(metric)))
                .unwrap_or_else(|_| Assessment::normal());
            (metric, assessment)
        })
        .collect();

    let overall = metrics
        .values()
        .map(|a| a.severity)
        .max()
        .unwrap_or(Severity::Normal);

    Classification { metrics, overall }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Deviation, MovementState};
    use chrono::{TimeZone, Utc};

    fn reading(temp: f64, hr: u32, rr: u32, spo2: u32) -> VitalReading {
        VitalReading {
            temperature_c: temp,
            heart_rate_bpm: hr,
            respiratory_rate_rpm: rr,
            oxygen_saturation_pct: spo2,
            movement: MovementState::Sleeping,
            observed_at: Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_all_normal_reading_is_normal_everywhere() {
        let c = classify(&reading(36.8, 120, 35, 98), &ThresholdTable::default());
        for metric in Metric::ALL {
            assert_eq!(c.severity(metric), Severity::Normal, "{} should be normal", metric);
        }
        assert_eq!(c.overall, Severity::Normal);
        assert_eq!(c.abnormal().count(), 0);
    }

    #[test]
    fn test_high_fever_is_critical_overall() {
        let c = classify(&reading(38.6, 130, 35, 97), &ThresholdTable::default());
        assert_eq!(c.severity(Metric::Temperature), Severity::Critical);
        assert_eq!(c.assessment(Metric::Temperature).deviation, Some(Deviation::High));
        assert_eq!(c.severity(Metric::HeartRate), Severity::Normal);
        assert_eq!(c.severity(Metric::RespiratoryRate), Severity::Normal);
        assert_eq!(c.severity(Metric::OxygenSaturation), Severity::Normal);
        assert_eq!(c.overall, Severity::Critical);
    }

    #[test]
    fn test_low_saturation_is_attention() {
        let c = classify(&reading(36.8, 120, 35, 92), &ThresholdTable::default());
        assert_eq!(c.severity(Metric::OxygenSaturation), Severity::Attention);
        assert_eq!(c.overall, Severity::Attention);
        let abnormal: Vec<_> = c.abnormal().map(|(m, _)| m).collect();
        assert_eq!(abnormal, vec![Metric::OxygenSaturation]);
    }

    #[test]
    fn test_exact_critical_boundaries_are_critical() {
        let table = ThresholdTable::default();
        let boundary_cases = [
            (reading(38.5, 120, 35, 98), Metric::Temperature),
            (reading(35.0, 120, 35, 98), Metric::Temperature),
            (reading(36.8, 180, 35, 98), Metric::HeartRate),
            (reading(36.8, 80, 35, 98), Metric::HeartRate),
            (reading(36.8, 120, 60, 98), Metric::RespiratoryRate),
            (reading(36.8, 120, 20, 98), Metric::RespiratoryRate),
            (reading(36.8, 120, 35, 90), Metric::OxygenSaturation),
        ];
        for (r, metric) in boundary_cases {
            assert_eq!(
                classify(&r, &table).severity(metric),
                Severity::Critical,
                "{} exactly at critical boundary ({}) must be critical, not attention",
                metric,
                r.value(metric)
            );
        }
    }

    #[test]
    fn test_exact_attention_boundaries_are_attention() {
        let table = ThresholdTable::default();
        assert_eq!(
            classify(&reading(37.8, 120, 35, 98), &table).severity(Metric::Temperature),
            Severity::Attention
        );
        assert_eq!(
            classify(&reading(36.8, 160, 35, 98), &table).severity(Metric::HeartRate),
            Severity::Attention
        );
        assert_eq!(
            classify(&reading(36.8, 120, 25, 98), &table).severity(Metric::RespiratoryRate),
            Severity::Attention
        );
        assert_eq!(
            classify(&reading(36.8, 120, 35, 94), &table).severity(Metric::OxygenSaturation),
            Severity::Attention
        );
    }

    #[test]
    fn test_overall_is_maximum_of_metrics() {
        // Heart rate attention (165), oxygen critical (88).
        let c = classify(&reading(36.8, 165, 35, 88), &ThresholdTable::default());
        assert_eq!(c.severity(Metric::HeartRate), Severity::Attention);
        assert_eq!(c.severity(Metric::OxygenSaturation), Severity::Critical);
        assert_eq!(c.overall, Severity::Critical);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let table = ThresholdTable::default();
        let r = reading(37.9, 85, 55, 93);
        assert_eq!(classify(&r, &table), classify(&r, &table));
    }
}
