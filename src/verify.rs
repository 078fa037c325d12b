//! Sensor Endpoint Verification
//!
//! One-off connection test against a configured data source: can we reach
//! it, how long does it take, and which of the expected fields does its
//! payload carry? Nothing is classified and no alert is sent.
//!
//! Use this when pairing a new sensor or after changing its address.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::DataSource;
use crate::ingest::normalize::{present_fields, sensor_fields};
use crate::model::{AcquisitionError, Metric};

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointVerification {
    pub endpoint: String,
    pub status: VerificationStatus,
    pub connected: bool,
    pub message: String,
    pub latency_ms: Option<u64>,
    pub fields_present: Vec<String>,
    /// Expected fields absent under both spellings (canonical name listed).
    pub fields_missing: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

// ============================================================================
// Verification
// ============================================================================

pub fn verify_endpoint(source: &dyn DataSource) -> EndpointVerification {
    let mut result = EndpointVerification {
        endpoint: source.describe(),
        status: VerificationStatus::Failed,
        connected: false,
        message: String::new(),
        latency_ms: None,
        fields_present: Vec::new(),
        fields_missing: Vec::new(),
        checked_at: Utc::now(),
    };

    let started = Instant::now();
    let fetched = source.fetch();
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let payload = match fetched {
        Ok(payload) => payload,
        Err(e) => {
            result.message = failure_message(&e);
            return result;
        }
    };

    let fields = match sensor_fields(&payload) {
        Ok(fields) => fields,
        Err(e) => {
            result.message = failure_message(&e);
            return result;
        }
    };

    result.connected = true;
    result.latency_ms = Some(latency_ms);
    let present = present_fields(fields);
    result.fields_present = present.iter().map(|f| f.to_string()).collect();

    for metric in Metric::ALL {
        let found = present
            .iter()
            .any(|f| *f == metric.canonical_name() || *f == metric.localized_name());
        if !found {
            result.fields_missing.push(metric.canonical_name().to_string());
        }
    }
    if !present.iter().any(|f| *f == "movement" || *f == "movimento") {
        result.fields_missing.push("movement".to_string());
    }

    if result.fields_present.is_empty() {
        result.status = VerificationStatus::Failed;
        result.message = "Connected, but payload contains no sensor fields".to_string();
    } else if result.fields_missing.is_empty() {
        result.status = VerificationStatus::Success;
        result.message = "Connected - data received".to_string();
    } else {
        result.status = VerificationStatus::PartialSuccess;
        result.message = format!(
            "Connected - missing fields: {}",
            result.fields_missing.join(", ")
        );
    }

    result
}

fn failure_message(err: &AcquisitionError) -> String {
    match err {
        AcquisitionError::Timeout => "Sensor did not answer in time".to_string(),
        AcquisitionError::Transport(_) => format!("Sensor not found ({})", err),
        AcquisitionError::Http(code) => format!("HTTP error: {}", code),
        AcquisitionError::Malformed(msg) => format!("Unreadable payload: {}", msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    struct StaticSource(Result<Value, AcquisitionError>);

    impl DataSource for StaticSource {
        fn fetch(&self) -> Result<Value, AcquisitionError> {
            self.0.clone()
        }

        fn describe(&self) -> String {
            "http://sensor.test/api/dados".to_string()
        }
    }

    #[test]
    fn test_complete_payload_is_success() {
        let source = StaticSource(Ok(json!({
            "temperatura": 36.9, "batimentos": 118, "respiracao": 33,
            "saturacao": 98, "movimento": "dormindo"
        })));
        let report = verify_endpoint(&source);
        assert_eq!(report.status, VerificationStatus::Success);
        assert!(report.connected);
        assert!(report.latency_ms.is_some());
        assert!(report.fields_missing.is_empty());
        assert_eq!(report.endpoint, "http://sensor.test/api/dados");
    }

    #[test]
    fn test_partial_payload_lists_missing_fields() {
        let source = StaticSource(Ok(json!({ "temperature": 36.9, "heartRate": 118 })));
        let report = verify_endpoint(&source);
        assert_eq!(report.status, VerificationStatus::PartialSuccess);
        assert_eq!(
            report.fields_missing,
            vec!["respiratoryRate", "oxygenSaturation", "movement"]
        );
    }

    #[test]
    fn test_http_failure_is_failed_and_disconnected() {
        let report = verify_endpoint(&StaticSource(Err(AcquisitionError::Http(404))));
        assert_eq!(report.status, VerificationStatus::Failed);
        assert!(!report.connected);
        assert_eq!(report.latency_ms, None);
        assert_eq!(report.message, "HTTP error: 404");
    }

    #[test]
    fn test_report_serializes_to_json() {
        let report = verify_endpoint(&StaticSource(Ok(json!({ "saturacao": 97 }))));
        let text = serde_json::to_string(&report).expect("report serializes");
        assert!(text.contains("\"status\":\"PartialSuccess\""));
    }
}
