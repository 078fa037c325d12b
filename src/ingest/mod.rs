//! Sensor data acquisition.
//!
//! Submodules:
//! - `sensor`   : blocking HTTP client for the bedside sensor endpoint.
//! - `normalize`: tolerant conversion of raw payloads into `VitalReading`s.

pub mod normalize;
pub mod sensor;

use std::sync::Arc;

use serde_json::Value;

use crate::model::AcquisitionError;

/// Where raw sensor payloads come from.
///
/// `fetch` may block but must resolve within a finite timeout.
pub trait DataSource: Send + Sync {
    fn fetch(&self) -> Result<Value, AcquisitionError>;

    /// Human-readable location, for logs and connection reports.
    fn describe(&self) -> String;
}

impl<T: DataSource + ?Sized> DataSource for Arc<T> {
    fn fetch(&self) -> Result<Value, AcquisitionError> {
        (**self).fetch()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
