//! Infant vital-sign monitoring service.
//!
//! Polls a bedside sensor, classifies each reading against per-metric
//! threshold bands and dispatches deduplicated alerts to a notification
//! sink.

pub mod acquisition;
pub mod alert;
pub mod config;
pub mod dev_mode;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod verify;
