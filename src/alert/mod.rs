//! Classification, deduplication and dispatch of vital-sign alerts.
//!
//! Submodules, leaf-first:
//! - `thresholds` : per-metric critical/attention bands and the live store.
//! - `classifier` : reading → per-metric severity.
//! - `cooldown`   : last-fired registry keyed by `(metric, severity)`.
//! - `dispatch`   : notification building and delivery to a sink.
//! - `dedup`      : ties the above together for one reading.
//! - `stalenesses`: is the last reading still recent enough to trust?

pub mod classifier;
pub mod cooldown;
pub mod dedup;
pub mod dispatch;
pub mod stalenesses;
pub mod thresholds;
