//! Periodic acquisition loop.
//!
//! A dedicated thread fetches the latest payload from the data source at a
//! fixed interval, normalizes it, and feeds the reading to the
//! deduplicator. Fetch failures mark the connection disconnected and skip
//! the tick; the loop keeps its cadence and simply tries again at the next
//! slot (no backoff).
//!
//! Ticks of one loop never overlap: each runs to completion on the worker
//! thread before the next deadline is considered. A manual `refresh_once`
//! runs on the caller's thread through the same fetch → normalize →
//! classify → dedupe path and may run alongside a periodic tick.
//!
//! Stopping is immediate for future ticks. A fetch already in flight is
//! allowed to finish, but its result is discarded; once `stop` returns no
//! further dispatch can happen from that worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::alert::dedup::{Deduplicator, Evaluation};
use crate::ingest::DataSource;
use crate::ingest::normalize::normalize;
use crate::logging::{self, Component};
use crate::model::{AcquisitionError, VitalReading};

/// One fetch per second.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

/// Shorter intervals, including zero, are raised to this.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

/// Connectivity as seen by the host (dashboard indicator, latency badge).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionState {
    pub connected: bool,
    /// Short human-readable status, e.g. "Connected" or "Disconnected".
    pub status: String,
    /// Round-trip time of the last successful fetch; `None` while
    /// disconnected.
    pub latency_ms: Option<u64>,
    /// Reason for the most recent failure, cleared on success.
    pub last_error: Option<String>,
    pub last_reading: Option<VitalReading>,
    /// When the last successful reading was observed.
    pub last_update: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub total_fetches: u64,
    pub failed_fetches: u64,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            connected: false,
            status: "Disconnected".to_string(),
            latency_ms: None,
            last_error: None,
            last_reading: None,
            last_update: None,
            consecutive_failures: 0,
            total_fetches: 0,
            failed_fetches: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickTrigger {
    Periodic,
    Manual,
}

/// Result of one successful tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub reading: VitalReading,
    pub evaluation: Evaluation,
    pub latency: Duration,
    /// Fields filled from the last-known-good reading or defaults.
    pub defaulted: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub interval: Duration,
    pub subject_id: Option<String>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self { interval: DEFAULT_INTERVAL, subject_id: None }
    }
}

// ---------------------------------------------------------------------------
// Shared pipeline
// ---------------------------------------------------------------------------

struct Fetched {
    result: Result<Value, AcquisitionError>,
    latency: Duration,
    observed_at: DateTime<Utc>,
}

struct Pipeline {
    source: Arc<dyn DataSource>,
    dedup: Arc<Deduplicator>,
    state: Mutex<ConnectionState>,
    subject_id: Option<String>,
}

impl Pipeline {
    fn fetch(&self) -> Fetched {
        let started = Instant::now();
        let result = self.source.fetch();
        Fetched {
            result,
            latency: started.elapsed(),
            observed_at: Utc::now(),
        }
    }

    /// Normalizes and, on success, classifies and dispatches. A failure
    /// updates connectivity only: no classification, no cooldown change.
    fn complete(&self, trigger: TickTrigger, fetched: Fetched) -> Result<TickReport, AcquisitionError> {
        let subject = self.subject_id.as_deref();
        let last_good = self.lock_state().last_reading.clone();

        let normalized = fetched
            .result
            .and_then(|payload| normalize(&payload, last_good.as_ref(), fetched.observed_at));

        let normalized = match normalized {
            Ok(n) => n,
            Err(e) => {
                self.mark_disconnected(trigger, &e);
                let operation = match trigger {
                    TickTrigger::Periodic => "Poll",
                    TickTrigger::Manual => "Manual refresh",
                };
                logging::log_fetch_failure(subject, operation, &e);
                return Err(e);
            }
        };

        if !normalized.defaulted.is_empty() {
            logging::debug(
                Component::Source,
                subject,
                &format!("Filled missing fields: {}", normalized.defaulted.join(", ")),
            );
        }

        self.mark_connected(trigger, &normalized.reading, fetched.latency);

        let evaluation = self.dedup.process(&normalized.reading, normalized.reading.observed_at);
        Ok(TickReport {
            reading: normalized.reading,
            evaluation,
            latency: fetched.latency,
            defaulted: normalized.defaulted,
        })
    }

    fn mark_connected(&self, trigger: TickTrigger, reading: &VitalReading, latency: Duration) {
        let mut state = self.lock_state();
        if !state.connected {
            logging::info(
                Component::Loop,
                self.subject_id.as_deref(),
                &format!("Sensor connected ({} ms)", latency.as_millis()),
            );
        }
        state.connected = true;
        state.status = match trigger {
            TickTrigger::Periodic => "Connected".to_string(),
            TickTrigger::Manual => "Connected - Manual".to_string(),
        };
        state.latency_ms = Some(u64::try_from(latency.as_millis()).unwrap_or(u64::MAX));
        state.last_error = None;
        state.last_reading = Some(reading.clone());
        state.last_update = Some(reading.observed_at);
        state.consecutive_failures = 0;
        state.total_fetches += 1;
    }

    fn mark_disconnected(&self, trigger: TickTrigger, err: &AcquisitionError) {
        let mut state = self.lock_state();
        state.connected = false;
        state.status = match trigger {
            TickTrigger::Periodic => "Disconnected".to_string(),
            TickTrigger::Manual => "Refresh failed".to_string(),
        };
        state.latency_ms = None;
        state.last_error = Some(err.to_string());
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.total_fetches += 1;
        state.failed_fetches += 1;
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Cancellation flag plus the gate a tick holds while it dispatches.
#[derive(Default)]
struct Cancellation {
    cancelled: AtomicBool,
    gate: Mutex<()>,
}

impl Cancellation {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct Worker {
    stop_tx: mpsc::Sender<()>,
    cancellation: Arc<Cancellation>,
    handle: JoinHandle<()>,
}

/// Timer-driven puller for one monitored subject.
pub struct AcquisitionLoop {
    pipeline: Arc<Pipeline>,
    interval: Duration,
    worker: Mutex<Option<Worker>>,
}

impl AcquisitionLoop {
    pub fn new(source: Arc<dyn DataSource>, dedup: Arc<Deduplicator>, config: LoopConfig) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                source,
                dedup,
                state: Mutex::new(ConnectionState::default()),
                subject_id: config.subject_id,
            }),
            interval: config.interval.max(MIN_INTERVAL),
            worker: Mutex::new(None),
        }
    }

    /// Starts periodic polling. The first tick fires immediately. Any
    /// worker already running is stopped first, so there is never more than
    /// one poller per loop.
    pub fn start(&self) -> std::io::Result<()> {
        let mut slot = self.lock_worker();
        if let Some(previous) = slot.take() {
            let _ = cancel(previous);
        }

        let (stop_tx, stop_rx) = mpsc::channel();
        let cancellation = Arc::new(Cancellation::default());
        let pipeline = Arc::clone(&self.pipeline);
        let worker_cancellation = Arc::clone(&cancellation);
        let interval = self.interval;

        let handle = thread::Builder::new()
            .name("vitmon-acquisition".to_string())
            .spawn(move || run_worker(pipeline, interval, stop_rx, worker_cancellation))?;

        *slot = Some(Worker { stop_tx, cancellation, handle });
        logging::info(
            Component::Loop,
            self.pipeline.subject_id.as_deref(),
            &format!(
                "Polling {} every {} ms",
                self.pipeline.source.describe(),
                self.interval.as_millis()
            ),
        );
        Ok(())
    }

    /// Stops periodic polling. Returns once no tick from the stopped worker
    /// can dispatch anymore; does not wait for an in-flight fetch.
    pub fn stop(&self) {
        let previous = self.lock_worker().take();
        if let Some(worker) = previous {
            let _ = cancel(worker);
            logging::info(Component::Loop, self.pipeline.subject_id.as_deref(), "Polling stopped");
        }
    }

    /// `stop`, then wait for the worker thread to exit.
    pub fn shutdown(&self) {
        let previous = self.lock_worker().take();
        if let Some(worker) = previous {
            let handle = cancel(worker);
            if handle.join().is_err() {
                logging::error(
                    Component::Loop,
                    self.pipeline.subject_id.as_deref(),
                    "Acquisition worker panicked",
                );
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_worker().is_some()
    }

    /// One-shot fetch and classify on the caller's thread (pull-to-refresh).
    pub fn refresh_once(&self) -> Result<TickReport, AcquisitionError> {
        let fetched = self.pipeline.fetch();
        self.pipeline.complete(TickTrigger::Manual, fetched)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.pipeline.lock_state().clone()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for AcquisitionLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Flags the worker cancelled, wakes it, and waits out any tick currently
/// past its fetch so nothing dispatches after this returns.
fn cancel(worker: Worker) -> JoinHandle<()> {
    worker.cancellation.cancelled.store(true, Ordering::SeqCst);
    let _ = worker.stop_tx.send(());
    drop(worker.cancellation.gate.lock().unwrap_or_else(|e| e.into_inner()));
    worker.handle
}

fn run_worker(
    pipeline: Arc<Pipeline>,
    interval: Duration,
    stop_rx: mpsc::Receiver<()>,
    cancellation: Arc<Cancellation>,
) {
    let mut next_tick = Some(Instant::now());

    loop {
        let Some(deadline) = next_tick else {
            // Interval too large to schedule: idle until stopped.
            let _ = stop_rx.recv();
            break;
        };
        let wait = deadline.saturating_duration_since(Instant::now());
        match stop_rx.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        if cancellation.is_cancelled() {
            break;
        }

        let fetched = pipeline.fetch();
        {
            let _gate = cancellation.gate.lock().unwrap_or_else(|e| e.into_inner());
            if cancellation.is_cancelled() {
                logging::debug(
                    Component::Loop,
                    pipeline.subject_id.as_deref(),
                    "Discarding fetch that completed after stop",
                );
                break;
            }
            let _ = pipeline.complete(TickTrigger::Periodic, fetched);
        }

        next_tick = next_deadline(deadline, interval, Instant::now());
    }
}

/// Next slot on the fixed cadence. When a slow tick has overrun it, the
/// missed slots are skipped and the cadence restarts from `now`. `None`
/// when the deadline is not representable.
fn next_deadline(previous: Instant, interval: Duration, now: Instant) -> Option<Instant> {
    match previous.checked_add(interval) {
        Some(next) if next > now => Some(next),
        _ => now.checked_add(interval),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::cooldown::CooldownRegistry;
    use crate::alert::dispatch::{Dispatcher, Notification, NotificationSink};
    use crate::alert::thresholds::ThresholdStore;
    use crate::model::DispatchError;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct FixedSource(Result<Value, AcquisitionError>);

    impl DataSource for FixedSource {
        fn fetch(&self) -> Result<Value, AcquisitionError> {
            self.0.clone()
        }

        fn describe(&self) -> String {
            "fixed".to_string()
        }
    }

    #[derive(Default)]
    struct CountingSink(AtomicUsize);

    impl NotificationSink for CountingSink {
        fn deliver(&self, _: &Notification) -> Result<(), DispatchError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn build(source: FixedSource, sink: Arc<CountingSink>) -> (AcquisitionLoop, Arc<Deduplicator>) {
        let dedup = Arc::new(Deduplicator::new(
            Arc::new(ThresholdStore::default()),
            CooldownRegistry::default(),
            Dispatcher::new(sink),
        ));
        let acquisition = AcquisitionLoop::new(
            Arc::new(source),
            Arc::clone(&dedup),
            LoopConfig { interval: Duration::from_millis(10), subject_id: None },
        );
        (acquisition, dedup)
    }

    #[test]
    fn test_initial_state_is_disconnected() {
        let (acquisition, _) = build(FixedSource(Ok(json!({}))), Arc::default());
        let state = acquisition.connection_state();
        assert!(!state.connected);
        assert_eq!(state.latency_ms, None);
        assert!(!acquisition.is_running());
    }

    #[test]
    fn test_refresh_once_success_marks_connected() {
        let sink = Arc::new(CountingSink::default());
        let (acquisition, _) = build(
            FixedSource(Ok(json!({ "temperatura": 38.6, "batimentos": 130 }))),
            sink.clone(),
        );
        let report = acquisition.refresh_once().expect("payload is valid");
        assert_eq!(report.reading.temperature_c, 38.6);
        assert_eq!(report.evaluation.fired.len(), 1);

        let state = acquisition.connection_state();
        assert!(state.connected);
        assert_eq!(state.status, "Connected - Manual");
        assert!(state.latency_ms.is_some());
        assert_eq!(state.last_reading, Some(report.reading));
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_refresh_once_failure_marks_disconnected() {
        let sink = Arc::new(CountingSink::default());
        let (acquisition, _) = build(FixedSource(Err(AcquisitionError::Http(503))), sink.clone());
        assert_eq!(acquisition.refresh_once(), Err(AcquisitionError::Http(503)));

        let state = acquisition.connection_state();
        assert!(!state.connected);
        assert_eq!(state.last_error.as_deref(), Some("HTTP error: 503"));
        assert_eq!(state.consecutive_failures, 1);
        assert_eq!(state.failed_fetches, 1);
        assert_eq!(sink.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_interval_is_raised_to_minimum() {
        let dedup = Arc::new(Deduplicator::new(
            Arc::new(ThresholdStore::default()),
            CooldownRegistry::default(),
            Dispatcher::new(Arc::new(CountingSink::default())),
        ));
        let acquisition = AcquisitionLoop::new(
            Arc::new(FixedSource(Ok(json!({ "saturacao": 98 })))),
            dedup,
            LoopConfig { interval: Duration::ZERO, subject_id: None },
        );
        assert_eq!(acquisition.interval(), MIN_INTERVAL);
    }

    #[test]
    fn test_next_deadline_keeps_cadence_when_on_time() {
        let start = Instant::now();
        let interval = Duration::from_millis(100);
        let next = next_deadline(start, interval, start + Duration::from_millis(30));
        assert_eq!(next, Some(start + interval));
    }

    #[test]
    fn test_next_deadline_skips_missed_slots() {
        let start = Instant::now();
        let interval = Duration::from_millis(100);
        let now = start + Duration::from_millis(350);
        assert_eq!(next_deadline(start, interval, now), Some(now + interval));
    }

    #[test]
    fn test_next_deadline_always_moves_forward() {
        let start = Instant::now();
        let now = start + Duration::from_millis(5);
        let next = next_deadline(start, MIN_INTERVAL, now).expect("representable");
        assert!(next > now);
    }

    #[test]
    fn test_next_deadline_overflow_is_none() {
        let now = Instant::now();
        assert_eq!(next_deadline(now, Duration::MAX, now), None);
    }

    #[test]
    fn test_start_twice_keeps_single_worker() {
        let (acquisition, _) = build(FixedSource(Ok(json!({ "saturacao": 98 }))), Arc::default());
        acquisition.start().expect("spawn");
        acquisition.start().expect("restart");
        assert!(acquisition.is_running());
        acquisition.shutdown();
        assert!(!acquisition.is_running());
    }
}
