//! Reading staleness detection.
//!
//! The sensor pushes a fresh sample every second under normal conditions.
//! A loop that keeps failing, or a sensor that answers with a frozen
//! sample, is not always obvious from the connected flag alone, so the
//! host can ask whether the last reading is still recent enough to trust.
//!
//! # Clock injection
//! `is_stale_at` takes `now` explicitly; `is_stale` is the wall-clock
//! wrapper.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::acquisition::ConnectionState;

/// Returns `true` if the last successful reading is older than `max_age`
/// relative to `now`, or if no reading was ever received.
///
/// Staleness is strictly greater than the threshold:
///   age > max_age  →  stale
///   age == max_age →  not stale
pub fn is_stale_at(state: &ConnectionState, max_age: Duration, now: DateTime<Utc>) -> bool {
    match state.last_update {
        None => true,
        Some(last) => {
            let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
            now.signed_duration_since(last) > max_age
        }
    }
}

/// Convenience wrapper that uses the real current time.
/// Use `is_stale_at` in tests to keep them deterministic.
pub fn is_stale(state: &ConnectionState, max_age: Duration) -> bool {
    is_stale_at(state, max_age, Utc::now())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
