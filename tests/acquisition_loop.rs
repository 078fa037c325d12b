//! Periodic acquisition integration tests
//!
//! These run the real worker thread with a short interval, so assertions
//! poll for the expected condition with a generous deadline instead of
//! sleeping for a fixed tick count.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use vitmon_service::alert::dispatch::{Notification, NotificationSink};
use vitmon_service::dev_mode::ReplaySource;
use vitmon_service::ingest::DataSource;
use vitmon_service::model::{AcquisitionError, AlertKey, DispatchError, Metric, Severity};
use vitmon_service::monitor::{Monitor, MonitorSettings};

const TICK: Duration = Duration::from_millis(10);
const DEADLINE: Duration = Duration::from_secs(5);

#[derive(Default)]
struct CountingSink(AtomicUsize);

impl CountingSink {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl NotificationSink for CountingSink {
    fn deliver(&self, _: &Notification) -> Result<(), DispatchError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Blocks every fetch until the test releases it.
struct HeldSource {
    entered: AtomicBool,
    release: Mutex<Receiver<()>>,
    payload: Value,
}

impl HeldSource {
    fn new(payload: Value) -> (Self, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let source = Self {
            entered: AtomicBool::new(false),
            release: Mutex::new(rx),
            payload,
        };
        (source, tx)
    }
}

impl DataSource for HeldSource {
    fn fetch(&self) -> Result<Value, AcquisitionError> {
        self.entered.store(true, Ordering::SeqCst);
        let _ = self.release.lock().unwrap().recv();
        Ok(self.payload.clone())
    }

    fn describe(&self) -> String {
        "held".to_string()
    }
}

fn fever() -> Value {
    json!({
        "temperatura": 38.9, "batimentos": 120, "respiracao": 35,
        "saturacao": 98, "movimento": "agitado"
    })
}

fn normal() -> Value {
    json!({
        "temperatura": 36.8, "batimentos": 120, "respiracao": 35,
        "saturacao": 98, "movimento": "dormindo"
    })
}

fn fast_settings() -> MonitorSettings {
    MonitorSettings { interval: TICK, ..MonitorSettings::default() }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < DEADLINE {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_periodic_ticks_alert_once_per_cooldown() {
    let sink = Arc::new(CountingSink::default());
    let source = ReplaySource::new("loop", vec![fever()]).unwrap();
    let monitor = Monitor::new("baby-1", Arc::new(source), sink.clone(), fast_settings());

    monitor.start().expect("spawn worker");
    assert!(wait_until(|| monitor.connection_state().total_fetches >= 10));
    monitor.shutdown();

    assert_eq!(sink.count(), 1, "many ticks inside the cooldown, one alert");
    let state = monitor.connection_state();
    assert!(state.connected);
    assert_eq!(state.status, "Connected");
}

#[test]
fn test_failed_ticks_keep_cadence_and_registry() {
    let sink = Arc::new(CountingSink::default());
    let source = ReplaySource::new("loop", vec![Value::Null]).unwrap();
    let monitor = Monitor::new("baby-1", Arc::new(source), sink.clone(), fast_settings());

    monitor.start().expect("spawn worker");
    assert!(
        wait_until(|| monitor.connection_state().consecutive_failures >= 3),
        "loop must keep polling after failures"
    );
    monitor.shutdown();

    let state = monitor.connection_state();
    assert!(!state.connected);
    assert_eq!(state.status, "Disconnected");
    assert_eq!(state.failed_fetches, state.total_fetches);
    assert_eq!(sink.count(), 0);
    assert_eq!(
        monitor.last_fired(AlertKey::new(Metric::Temperature, Severity::Critical)),
        None
    );
}

#[test]
fn test_loop_reconnects_after_outage() {
    let sink = Arc::new(CountingSink::default());
    let source = ReplaySource::new("loop", vec![Value::Null, Value::Null, normal()]).unwrap();
    let monitor = Monitor::new("baby-1", Arc::new(source), sink.clone(), fast_settings());

    monitor.start().expect("spawn worker");
    assert!(wait_until(|| monitor.connection_state().connected));
    monitor.shutdown();

    let state = monitor.connection_state();
    assert!(state.failed_fetches >= 2);
    assert!(state.last_reading.is_some());
}

#[test]
fn test_no_dispatch_after_stop() {
    let sink = Arc::new(CountingSink::default());
    let source = ReplaySource::new("loop", vec![fever()]).unwrap();
    let monitor = Monitor::new("baby-1", Arc::new(source), sink.clone(), fast_settings());

    monitor.start().expect("spawn worker");
    assert!(wait_until(|| sink.count() == 1));
    monitor.stop();
    assert!(!monitor.is_running());

    // Any further tick would fire again now.
    monitor.clear_alert_history();
    let fetches = monitor.connection_state().total_fetches;
    thread::sleep(TICK * 10);

    assert_eq!(sink.count(), 1);
    assert_eq!(monitor.connection_state().total_fetches, fetches);
}

#[test]
fn test_in_flight_fetch_is_discarded_after_stop() {
    let sink = Arc::new(CountingSink::default());
    let (source, release) = HeldSource::new(fever());
    let source = Arc::new(source);
    let monitor = Monitor::new("baby-1", source.clone(), sink.clone(), fast_settings());

    monitor.start().expect("spawn worker");
    assert!(wait_until(|| source.entered.load(Ordering::SeqCst)));

    monitor.stop();
    release.send(()).expect("worker still waiting");
    thread::sleep(TICK * 10);

    assert_eq!(sink.count(), 0, "result of a fetch that outlived stop must be dropped");
    assert_eq!(monitor.connection_state().total_fetches, 0);
}

#[test]
fn test_restart_keeps_single_worker() {
    let sink = Arc::new(CountingSink::default());
    let source = ReplaySource::new("loop", vec![normal()]).unwrap();
    let monitor = Monitor::new("baby-1", Arc::new(source), sink, fast_settings());

    monitor.start().expect("spawn worker");
    monitor.start().expect("restart worker");
    assert!(monitor.is_running());
    assert!(wait_until(|| monitor.connection_state().total_fetches >= 3));
    monitor.shutdown();
    assert!(!monitor.is_running());
}

#[test]
fn test_subjects_are_independent() {
    let sink_a = Arc::new(CountingSink::default());
    let sink_b = Arc::new(CountingSink::default());
    let a = Monitor::new(
        "baby-a",
        Arc::new(ReplaySource::new("a", vec![fever()]).unwrap()),
        sink_a.clone(),
        fast_settings(),
    );
    let b = Monitor::new(
        "baby-b",
        Arc::new(ReplaySource::new("b", vec![Value::Null]).unwrap()),
        sink_b.clone(),
        fast_settings(),
    );

    a.start().expect("spawn a");
    b.start().expect("spawn b");
    assert!(wait_until(|| sink_a.count() == 1 && b.connection_state().failed_fetches >= 2));
    a.shutdown();
    b.shutdown();

    assert!(a.connection_state().connected);
    assert!(!b.connection_state().connected);
    assert_eq!(sink_b.count(), 0);

    a.clear_alert_history();
    assert!(a.last_fired(AlertKey::new(Metric::Temperature, Severity::Critical)).is_none());
    assert_eq!(b.cooldown(), a.cooldown());
}

#[test]
fn test_zero_interval_keeps_polling_and_stops() {
    let sink = Arc::new(CountingSink::default());
    let source = ReplaySource::new("loop", vec![normal()]).unwrap();
    let settings = MonitorSettings { interval: Duration::ZERO, ..MonitorSettings::default() };
    let monitor = Arc::new(Monitor::new("baby-1", Arc::new(source), sink, settings));

    monitor.start().expect("spawn worker");
    assert!(
        wait_until(|| monitor.connection_state().total_fetches >= 5),
        "worker must keep ticking with a zero interval"
    );

    let (done_tx, done_rx) = mpsc::channel();
    let stopping = Arc::clone(&monitor);
    thread::spawn(move || {
        stopping.shutdown();
        let _ = done_tx.send(());
    });
    assert!(
        done_rx.recv_timeout(DEADLINE).is_ok(),
        "shutdown must return with a zero interval"
    );
    assert!(!monitor.is_running());
}
