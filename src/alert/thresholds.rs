//! Severity band table.
//!
//! Each metric carries two nested bands: `critical` (more extreme) and
//! `attention`. A value triggers a band when it is at or beyond one of the
//! band's bounds (`value <= min` or `value >= max`). Two-sided metrics set
//! both bounds; oxygen saturation only has a lower bound.
//!
//! The live table sits behind a `ThresholdStore`, which swaps whole tables
//! atomically so a classification never sees a half-updated table.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::model::{Deviation, Metric, Severity, ThresholdError};

// ---------------------------------------------------------------------------
// Bands
// ---------------------------------------------------------------------------

/// One trigger range. `None` means the band has no bound on that side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl Band {
    pub fn two_sided(min: f64, max: f64) -> Self {
        Self { min: Some(min), max: Some(max) }
    }

    pub fn lower_only(min: f64) -> Self {
        Self { min: Some(min), max: None }
    }

    /// Returns the side the value breaches, inclusive of the bound itself.
    pub fn breach(&self, value: f64) -> Option<Deviation> {
        if self.min.is_some_and(|min| value <= min) {
            Some(Deviation::Low)
        } else if self.max.is_some_and(|max| value >= max) {
            Some(Deviation::High)
        } else {
            None
        }
    }
}

/// Result of evaluating one value against a `ThresholdBand`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub severity: Severity,
    /// `None` when the value is normal.
    pub deviation: Option<Deviation>,
}

impl Assessment {
    pub fn normal() -> Self {
        Self { severity: Severity::Normal, deviation: None }
    }
}

/// Critical and attention bands for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBand {
    pub critical: Band,
    pub attention: Band,
}

impl ThresholdBand {
    /// Critical is tested first so a value inside both bands is never
    /// downgraded to attention.
    pub fn assess(&self, value: f64) -> Assessment {
        if let Some(deviation) = self.critical.breach(value) {
            return Assessment { severity: Severity::Critical, deviation: Some(deviation) };
        }
        if let Some(deviation) = self.attention.breach(value) {
            return Assessment { severity: Severity::Attention, deviation: Some(deviation) };
        }
        Assessment::normal()
    }

    /// Checks the nesting invariant: critical bounds sit at or beyond the
    /// attention bounds, both bands are framed on the same sides, and the
    /// attention band leaves a non-empty normal range.
    pub fn validate(&self, metric: Metric) -> Result<(), ThresholdError> {
        let invalid = |reason: String| ThresholdError::InvalidBand { metric, reason };

        let bounds = [
            self.critical.min,
            self.critical.max,
            self.attention.min,
            self.attention.max,
        ];
        if bounds.iter().flatten().any(|v| !v.is_finite()) {
            return Err(invalid("bounds must be finite".to_string()));
        }
        if self.critical.min.is_none() && self.critical.max.is_none() {
            return Err(invalid("critical band has no bounds".to_string()));
        }
        if self.critical.min.is_some() != self.attention.min.is_some()
            || self.critical.max.is_some() != self.attention.max.is_some()
        {
            return Err(invalid(
                "critical and attention bands must bound the same sides".to_string(),
            ));
        }
        if let (Some(c), Some(a)) = (self.critical.min, self.attention.min) {
            if c > a {
                return Err(invalid(format!(
                    "critical.min ({}) must not exceed attention.min ({})",
                    c, a
                )));
            }
        }
        if let (Some(a), Some(c)) = (self.attention.max, self.critical.max) {
            if a > c {
                return Err(invalid(format!(
                    "attention.max ({}) must not exceed critical.max ({})",
                    a, c
                )));
            }
        }
        if let (Some(min), Some(max)) = (self.attention.min, self.attention.max) {
            if min >= max {
                return Err(invalid(format!(
                    "attention.min ({}) must be below attention.max ({})",
                    min, max
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// A complete, validated mapping from every metric to its bands.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdTable {
    bands: BTreeMap<Metric, ThresholdBand>,
}

impl ThresholdTable {
    /// Builds a table, rejecting missing metrics and malformed bands.
    pub fn new(bands: BTreeMap<Metric, ThresholdBand>) -> Result<Self, ThresholdError> {
        for metric in Metric::ALL {
            let band = bands.get(&metric).ok_or(ThresholdError::MissingMetric(metric))?;
            band.validate(metric)?;
        }
        Ok(Self { bands })
    }

    /// Builds a table from name-keyed bands (config files, host overrides).
    ///
    /// Names may be canonical (`heartRate`), localized (`batimentos`) or
    /// snake_case. Any unrecognized name fails with `UnknownMetric`.
    pub fn from_named(named: HashMap<String, ThresholdBand>) -> Result<Self, ThresholdError> {
        let bands = resolve_names(named)?;
        Self::new(bands)
    }

    /// Returns a copy of this table with the named bands replaced, keeping
    /// every other metric as it is.
    pub fn merged(&self, overrides: HashMap<String, ThresholdBand>) -> Result<Self, ThresholdError> {
        let mut bands = self.bands.clone();
        bands.extend(resolve_names(overrides)?);
        Self::new(bands)
    }

    pub fn bands_for(&self, metric: Metric) -> Result<&ThresholdBand, ThresholdError> {
        self.bands.get(&metric).ok_or(ThresholdError::MissingMetric(metric))
    }

    /// Looks bands up by metric name, failing with `UnknownMetric` for names
    /// that do not denote a metric.
    pub fn bands_for_name(&self, name: &str) -> Result<&ThresholdBand, ThresholdError> {
        let metric = Metric::from_name(name)
            .ok_or_else(|| ThresholdError::UnknownMetric(name.to_string()))?;
        self.bands_for(metric)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Metric, &ThresholdBand)> {
        self.bands.iter()
    }
}

impl Default for ThresholdTable {
    /// Reference bands for infants aged 0-12 months.
    fn default() -> Self {
        let bands = BTreeMap::from([
            (
                Metric::Temperature,
                ThresholdBand {
                    critical: Band::two_sided(35.0, 38.5),
                    attention: Band::two_sided(35.5, 37.8),
                },
            ),
            (
                Metric::HeartRate,
                ThresholdBand {
                    critical: Band::two_sided(80.0, 180.0),
                    attention: Band::two_sided(90.0, 160.0),
                },
            ),
            (
                Metric::RespiratoryRate,
                ThresholdBand {
                    critical: Band::two_sided(20.0, 60.0),
                    attention: Band::two_sided(25.0, 50.0),
                },
            ),
            (
                Metric::OxygenSaturation,
                ThresholdBand {
                    critical: Band::lower_only(90.0),
                    attention: Band::lower_only(94.0),
                },
            ),
        ]);
        Self { bands }
    }
}

fn resolve_names(
    named: HashMap<String, ThresholdBand>,
) -> Result<BTreeMap<Metric, ThresholdBand>, ThresholdError> {
    named
        .into_iter()
        .map(|(name, band)| {
            Metric::from_name(&name)
                .map(|metric| (metric, band))
                .ok_or(ThresholdError::UnknownMetric(name))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Hot-swappable store
// ---------------------------------------------------------------------------

/// Holds the live table. Readers take an `Arc` snapshot; `replace_all`
/// swaps the whole table under the write lock.
#[derive(Debug)]
pub struct ThresholdStore {
    current: RwLock<Arc<ThresholdTable>>,
}

impl ThresholdStore {
    pub fn new(table: ThresholdTable) -> Self {
        Self { current: RwLock::new(Arc::new(table)) }
    }

    /// The table in force right now. Stays valid even if replaced later.
    pub fn snapshot(&self) -> Arc<ThresholdTable> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn bands_for(&self, metric: Metric) -> Result<ThresholdBand, ThresholdError> {
        self.snapshot().bands_for(metric).copied()
    }

    pub fn replace_all(&self, table: ThresholdTable) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(table);
    }
}

impl Default for ThresholdStore {
    fn default() -> Self {
        Self::new(ThresholdTable::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
