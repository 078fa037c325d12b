//! Alert cooldown registry.
//!
//! Remembers when each `AlertKey` last fired so the same class of alert is
//! not repeated inside the cooldown window. Entries live until
//! `clear_history`; a key with no entry is always eligible.
//!
//! # Clock injection
//! Every operation takes `now` explicitly rather than reading the clock, so
//! the cooldown law is testable without sleeping.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::model::AlertKey;

/// Five minutes between alerts of the same key.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct CooldownRegistry {
    last_fired: HashMap<AlertKey, DateTime<Utc>>,
    cooldown: Duration,
}

impl CooldownRegistry {
    pub fn new(cooldown: Duration) -> Self {
        Self { last_fired: HashMap::new(), cooldown }
    }

    /// Returns `true` iff `key` never fired or fired strictly more than
    /// `cooldown` before `now`. Read-only.
    ///
    ///   now - last == cooldown →  still suppressed
    ///   now - last >  cooldown →  eligible
    pub fn should_fire(&self, key: AlertKey, now: DateTime<Utc>, cooldown: Duration) -> bool {
        match self.last_fired.get(&key) {
            None => true,
            Some(last) => now.signed_duration_since(*last) > to_delta(cooldown),
        }
    }

    /// `should_fire` against the configured cooldown.
    pub fn is_eligible(&self, key: AlertKey, now: DateTime<Utc>) -> bool {
        self.should_fire(key, now, self.cooldown)
    }

    /// Unconditionally records `now` as the last firing of `key`. Call only
    /// after a successful dispatch.
    pub fn record_fired(&mut self, key: AlertKey, now: DateTime<Utc>) {
        self.last_fired.insert(key, now);
    }

    pub fn last_fired(&self, key: AlertKey) -> Option<DateTime<Utc>> {
        self.last_fired.get(&key).copied()
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn set_cooldown(&mut self, cooldown: Duration) {
        self.cooldown = cooldown;
    }

    pub fn clear_history(&mut self) {
        self.last_fired.clear();
    }

    pub fn len(&self) -> usize {
        self.last_fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_fired.is_empty()
    }
}

impl Default for CooldownRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

/// Saturates instead of overflowing for absurdly long cooldowns.
fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
