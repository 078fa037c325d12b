//! One monitored subject, fully wired.
//!
//! `Monitor` owns the threshold store, cooldown registry (inside the
//! deduplicator) and acquisition loop for a single subject and exposes the
//! host-facing configuration surface. Nothing here is global: two monitors
//! never share cooldowns, thresholds or connection state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::acquisition::{AcquisitionLoop, ConnectionState, DEFAULT_INTERVAL, LoopConfig, TickReport};
use crate::alert::cooldown::{CooldownRegistry, DEFAULT_COOLDOWN};
use crate::alert::dedup::Deduplicator;
use crate::alert::dispatch::{Dispatcher, NotificationSink};
use crate::alert::stalenesses;
use crate::alert::thresholds::{ThresholdBand, ThresholdStore, ThresholdTable};
use crate::config::{Config, ConfigError};
use crate::ingest::DataSource;
use crate::logging::{self, Component};
use crate::model::{AcquisitionError, AlertKey, ThresholdError};

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub cooldown: Duration,
    pub thresholds: ThresholdTable,
    pub attention_sound: bool,
    pub stale_after: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            cooldown: DEFAULT_COOLDOWN,
            thresholds: ThresholdTable::default(),
            attention_sound: true,
            stale_after: Duration::from_secs(10),
        }
    }
}

pub struct Monitor {
    subject_id: String,
    thresholds: Arc<ThresholdStore>,
    dedup: Arc<Deduplicator>,
    acquisition: AcquisitionLoop,
    stale_after: Duration,
}

impl Monitor {
    pub fn new(
        subject_id: impl Into<String>,
        source: Arc<dyn DataSource>,
        sink: Arc<dyn NotificationSink>,
        settings: MonitorSettings,
    ) -> Self {
        let subject_id = subject_id.into();
        let thresholds = Arc::new(ThresholdStore::new(settings.thresholds));
        let dispatcher = Dispatcher::new(sink)
            .with_attention_sound(settings.attention_sound)
            .with_subject(subject_id.clone());
        let dedup = Arc::new(
            Deduplicator::new(
                Arc::clone(&thresholds),
                CooldownRegistry::new(settings.cooldown),
                dispatcher,
            )
            .with_subject(subject_id.clone()),
        );
        let acquisition = AcquisitionLoop::new(
            source,
            Arc::clone(&dedup),
            LoopConfig {
                interval: settings.interval,
                subject_id: Some(subject_id.clone()),
            },
        );

        Self {
            subject_id,
            thresholds,
            dedup,
            acquisition,
            stale_after: settings.stale_after,
        }
    }

    pub fn from_config(
        config: &Config,
        source: Arc<dyn DataSource>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, ConfigError> {
        let settings = MonitorSettings {
            interval: config.acquisition.interval(),
            cooldown: config.alerts.cooldown(),
            thresholds: config.threshold_table()?,
            attention_sound: config.alerts.attention_sound,
            stale_after: config.acquisition.stale_after(),
        };
        Ok(Self::new(config.subject_id.clone(), source, sink, settings))
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    // -----------------------------------------------------------------------
    // Configuration surface
    // -----------------------------------------------------------------------

    /// Takes effect for the next eligibility check; history is kept.
    pub fn set_cooldown(&self, cooldown: Duration) {
        self.dedup.set_cooldown(cooldown);
    }

    pub fn cooldown(&self) -> Duration {
        self.dedup.cooldown()
    }

    /// Swaps the whole table atomically. Readings classified after this
    /// returns use the new bands.
    pub fn replace_thresholds(&self, table: ThresholdTable) {
        self.thresholds.replace_all(table);
        logging::info(Component::Classifier, Some(&self.subject_id), "Threshold table replaced");
    }

    /// Applies per-metric overrides on top of the current table. On error
    /// the current table stays in place.
    pub fn update_thresholds(
        &self,
        overrides: HashMap<String, ThresholdBand>,
    ) -> Result<(), ThresholdError> {
        let table = self.thresholds.snapshot().merged(overrides)?;
        self.replace_thresholds(table);
        Ok(())
    }

    pub fn thresholds(&self) -> Arc<ThresholdTable> {
        self.thresholds.snapshot()
    }

    pub fn clear_alert_history(&self) {
        self.dedup.clear_history();
    }

    pub fn last_fired(&self, key: AlertKey) -> Option<DateTime<Utc>> {
        self.dedup.last_fired(key)
    }

    // -----------------------------------------------------------------------
    // Acquisition
    // -----------------------------------------------------------------------

    pub fn start(&self) -> std::io::Result<()> {
        self.acquisition.start()
    }

    pub fn stop(&self) {
        self.acquisition.stop();
    }

    /// Stops and waits for the worker thread to exit.
    pub fn shutdown(&self) {
        self.acquisition.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.acquisition.is_running()
    }

    pub fn refresh_once(&self) -> Result<TickReport, AcquisitionError> {
        self.acquisition.refresh_once()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.acquisition.connection_state()
    }

    pub fn is_stale(&self) -> bool {
        stalenesses::is_stale(&self.acquisition.connection_state(), self.stale_after)
    }
}
