//! Service configuration.
//!
//! Loaded from a TOML file in which every section is optional, then
//! overridden from the environment (a `.env` file is honored). Example:
//!
//! ```toml
//! subject_id = "baby-1"
//!
//! [source]
//! base_url = "http://192.168.1.77:3000"
//! path = "/api/dados"
//! timeout_ms = 3000
//!
//! [acquisition]
//! interval_ms = 1000
//!
//! [alerts]
//! cooldown_secs = 300
//!
//! [thresholds.temperature]
//! critical = { min = 35.0, max = 38.5 }
//! attention = { min = 35.5, max = 37.8 }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::alert::cooldown::DEFAULT_COOLDOWN;
use crate::alert::thresholds::{ThresholdBand, ThresholdTable};
use crate::ingest::sensor::{DEFAULT_BASE_URL, DEFAULT_PATH};
use crate::logging::LogLevel;
use crate::model::ThresholdError;

/// Upper bound on the sensor fetch timeout.
const MAX_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid thresholds: {0}")]
    Thresholds(#[from] ThresholdError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub path: String,
    pub timeout_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            path: DEFAULT_PATH.to_string(),
            timeout_ms: 3_000,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub interval_ms: u64,
    /// Age after which the last reading is reported stale.
    pub stale_after_secs: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self { interval_ms: 1_000, stale_after_secs: 10 }
    }
}

impl AcquisitionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub cooldown_secs: u64,
    /// Play a sound for attention-level alerts (critical always do).
    pub attention_sound: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: DEFAULT_COOLDOWN.as_secs(),
            attention_sound: true,
        }
    }
}

impl AlertConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: LogLevel::Info, file: None, timestamps: true }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub subject_id: String,
    pub source: SourceConfig,
    pub acquisition: AcquisitionConfig,
    pub alerts: AlertConfig,
    /// Per-metric overrides, merged over the default bands.
    pub thresholds: HashMap<String, ThresholdBand>,
    pub notify: NotifyConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            subject_id: "baby-1".to_string(),
            source: SourceConfig::default(),
            acquisition: AcquisitionConfig::default(),
            alerts: AlertConfig::default(),
            thresholds: HashMap::new(),
            notify: NotifyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Full startup path: `.env`, optional file, environment overrides,
    /// validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `VITMON_*` overrides looked up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("VITMON_BASE_URL") {
            self.source.base_url = url;
        }
        if let Some(path) = lookup("VITMON_SOURCE_PATH") {
            self.source.path = path;
        }
        if let Some(raw) = lookup("VITMON_INTERVAL_MS") {
            self.acquisition.interval_ms = parse_number("VITMON_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("VITMON_COOLDOWN_SECS") {
            self.alerts.cooldown_secs = parse_number("VITMON_COOLDOWN_SECS", &raw)?;
        }
        if let Some(raw) = lookup("VITMON_LOG_LEVEL") {
            self.logging.level = raw
                .parse::<LogLevel>()
                .map_err(|e| ConfigError::Invalid(format!("VITMON_LOG_LEVEL: {}", e)))?;
        }
        if let Some(url) = lookup("VITMON_WEBHOOK_URL") {
            self.notify.webhook_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.acquisition.interval_ms == 0 {
            return Err(ConfigError::Invalid("acquisition.interval_ms must be > 0".to_string()));
        }
        if self.source.timeout_ms == 0 || self.source.timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "source.timeout_ms must be between 1 and {}",
                MAX_TIMEOUT_MS
            )));
        }
        if self.source.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("source.base_url must not be empty".to_string()));
        }
        if self.subject_id.trim().is_empty() {
            return Err(ConfigError::Invalid("subject_id must not be empty".to_string()));
        }
        self.threshold_table()?;
        Ok(())
    }

    /// Default bands with this config's overrides applied.
    pub fn threshold_table(&self) -> Result<ThresholdTable, ThresholdError> {
        ThresholdTable::default().merged(self.thresholds.clone())
    }
}

fn parse_number(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} must be a non-negative integer, got '{}'", key, raw)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
