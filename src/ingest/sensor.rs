//! HTTP client for the bedside sensor.
//!
//! The sensor (a microcontroller on the local network) serves its latest
//! sample as JSON from a single GET endpoint, by default
//! `http://192.168.1.77:3000/api/dados`.

use std::time::Duration;

use serde_json::Value;

use crate::ingest::DataSource;
use crate::model::AcquisitionError;

pub const DEFAULT_BASE_URL: &str = "http://192.168.1.77:3000";
pub const DEFAULT_PATH: &str = "/api/dados";

/// Blocking HTTP data source with a hard request timeout, so a hung sensor
/// resolves as `Timeout` instead of stalling the acquisition loop.
pub struct HttpDataSource {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpDataSource {
    pub fn new(base_url: &str, path: &str, timeout: Duration) -> Result<Self, AcquisitionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| AcquisitionError::Transport(e.to_string()))?;
        Ok(Self { client, url: build_url(base_url, path) })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl DataSource for HttpDataSource {
    fn fetch(&self) -> Result<Value, AcquisitionError> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .map_err(map_reqwest_error)?;

        if !response.status().is_success() {
            return Err(AcquisitionError::Http(response.status().as_u16()));
        }

        let body = response.text().map_err(map_reqwest_error)?;
        parse_body(&body)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Joins base address and path with exactly one slash between them.
pub fn build_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Parses a response body into JSON; an empty body is malformed.
pub fn parse_body(body: &str) -> Result<Value, AcquisitionError> {
    if body.trim().is_empty() {
        return Err(AcquisitionError::Malformed("empty response body".to_string()));
    }
    serde_json::from_str(body).map_err(|e| AcquisitionError::Malformed(e.to_string()))
}

fn map_reqwest_error(err: reqwest::Error) -> AcquisitionError {
    if err.is_timeout() {
        AcquisitionError::Timeout
    } else if let Some(status) = err.status() {
        AcquisitionError::Http(status.as_u16())
    } else {
        AcquisitionError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_joins_with_single_slash() {
        assert_eq!(
            build_url("http://192.168.1.77:3000", "/api/dados"),
            "http://192.168.1.77:3000/api/dados"
        );
        assert_eq!(
            build_url("http://sensor.local/", "api/dados"),
            "http://sensor.local/api/dados"
        );
    }

    #[test]
    fn test_parse_body_rejects_empty_and_garbage() {
        assert!(matches!(parse_body(""), Err(AcquisitionError::Malformed(_))));
        assert!(matches!(parse_body("   \n"), Err(AcquisitionError::Malformed(_))));
        assert!(matches!(parse_body("<html>"), Err(AcquisitionError::Malformed(_))));
        assert!(parse_body(r#"{"temperatura": 36.9}"#).is_ok());
    }

    #[test]
    #[ignore] // Requires the physical sensor on the local network
    fn sensor_api_returns_a_payload() {
        let source = HttpDataSource::new(DEFAULT_BASE_URL, DEFAULT_PATH, Duration::from_secs(3))
            .expect("client builds");
        let payload = source.fetch().expect("sensor should answer");
        assert!(payload.is_object(), "sensor payload should be a JSON object");
    }
}
