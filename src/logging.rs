//! Structured logging for the vital-sign monitoring service.
//!
//! Every line carries the emitting component and, where relevant, the
//! monitored subject's identifier. Output goes to stderr and optionally to
//! an append-only log file for daemon operation. Backed by `tracing`, so
//! hosts embedding the library can install their own subscriber instead of
//! calling `init_logger`.

use std::fmt;
use std::fs::OpenOptions;
use std::str::FromStr;
use std::sync::Mutex;

use serde::Deserialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

use crate::model::AcquisitionError;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Source,
    Classifier,
    Cooldown,
    Dispatch,
    Loop,
    Config,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Source => write!(f, "SOURCE"),
            Component::Classifier => write!(f, "CLASSIFY"),
            Component::Cooldown => write!(f, "COOLDOWN"),
            Component::Dispatch => write!(f, "DISPATCH"),
            Component::Loop => write!(f, "LOOP"),
            Component::Config => write!(f, "CONFIG"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Unexpected failure - sensor firmware or configuration problem
    Unexpected,
    /// Unknown - sensor may simply be powered off or out of Wi-Fi range
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

/// Installs the global subscriber.
///
/// `RUST_LOG`, when set, takes precedence over `min_level`. Calling this
/// more than once is harmless: later calls leave the first subscriber in
/// place. Fails only if `log_file` cannot be opened.
pub fn init_logger(
    min_level: LogLevel,
    log_file: Option<&str>,
    console_timestamps: bool,
) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(min_level.as_directive()));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let timed_console = console_timestamps.then(|| {
        tracing_fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });
    let plain_console = (!console_timestamps).then(|| {
        tracing_fmt::layer()
            .without_time()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(timed_console)
        .with(plain_console)
        .with(file_layer)
        .try_init();
    Ok(())
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

fn render(component: Component, subject: Option<&str>, message: &str) -> String {
    let subject_part = subject.map(|s| format!(" [{}]", s)).unwrap_or_default();
    format!("{}{}: {}", component, subject_part, message)
}

pub fn info(component: Component, subject: Option<&str>, message: &str) {
    tracing::info!("{}", render(component, subject, message));
}

pub fn warn(component: Component, subject: Option<&str>, message: &str) {
    tracing::warn!("{}", render(component, subject, message));
}

pub fn error(component: Component, subject: Option<&str>, message: &str) {
    tracing::error!("{}", render(component, subject, message));
}

pub fn debug(component: Component, subject: Option<&str>, message: &str) {
    tracing::debug!("{}", render(component, subject, message));
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a sensor fetch failure.
///
/// A sensor that is switched off or out of range shows up as timeouts and
/// refused connections; that is worth a warning, not an error. A sensor
/// that answers with an error status or garbage is misbehaving.
pub fn classify_fetch_failure(err: &AcquisitionError) -> FailureType {
    match err {
        AcquisitionError::Timeout | AcquisitionError::Transport(_) => FailureType::Unknown,
        AcquisitionError::Http(_) | AcquisitionError::Malformed(_) => FailureType::Unexpected,
    }
}

/// Log a fetch failure at the level its classification warrants.
pub fn log_fetch_failure(subject: Option<&str>, operation: &str, err: &AcquisitionError) {
    let failure_type = classify_fetch_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Unexpected => error(Component::Source, subject, &message),
        FailureType::Unknown => warn(Component::Source, subject, &message),
    }
}

// ---------------------------------------------------------------------------
// Connectivity Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of fetch outcomes over a reporting window.
pub fn log_connectivity_summary(subject: Option<&str>, total: u64, successful: u64, failed: u64) {
    let message = format!(
        "Polling summary: {}/{} successful, {} failed",
        successful, total, failed
    );

    if failed == 0 {
        info(Component::Loop, subject, &message);
    } else if successful == 0 {
        error(Component::Loop, subject, &message);
    } else {
        warn(Component::Loop, subject, &message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("WARN".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert_eq!("debug".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_failure_classification() {
        assert_eq!(
            classify_fetch_failure(&AcquisitionError::Timeout),
            FailureType::Unknown
        );
        assert_eq!(
            classify_fetch_failure(&AcquisitionError::Transport("connection refused".into())),
            FailureType::Unknown
        );
        assert_eq!(
            classify_fetch_failure(&AcquisitionError::Http(500)),
            FailureType::Unexpected
        );
        assert_eq!(
            classify_fetch_failure(&AcquisitionError::Malformed("not json".into())),
            FailureType::Unexpected
        );
    }

    #[test]
    fn test_every_fetch_failure_is_logged_at_warn_or_above() {
        let errors = [
            AcquisitionError::Timeout,
            AcquisitionError::Transport("connection refused".into()),
            AcquisitionError::Http(503),
            AcquisitionError::Malformed("empty response body".into()),
        ];
        for err in &errors {
            let failure_type = classify_fetch_failure(err);
            assert!(
                matches!(failure_type, FailureType::Unknown | FailureType::Unexpected),
                "{} classified as {}",
                err,
                failure_type
            );
            log_fetch_failure(Some("baby-1"), "Poll", err);
        }
    }

    #[test]
    fn test_render_includes_subject_when_present() {
        assert_eq!(
            render(Component::Loop, Some("baby-1"), "tick"),
            "LOOP [baby-1]: tick"
        );
        assert_eq!(render(Component::System, None, "up"), "SYS: up");
    }

    #[test]
    fn test_init_logger_twice_is_harmless() {
        init_logger(LogLevel::Debug, None, false).expect("console-only init cannot fail");
        init_logger(LogLevel::Info, None, true).expect("second init is a no-op");
        info(Component::System, None, "logger initialized");
    }
}
