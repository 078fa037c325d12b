/// Development mode utilities for running without sensor hardware
///
/// When the bedside sensor is unavailable, use this module to replay
/// scripted payloads through the normal acquisition path.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use thiserror::Error;

use crate::ingest::DataSource;
use crate::model::AcquisitionError;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Failed to read replay file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Replay file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Replay script must be a non-empty JSON array")]
    Empty,
}

/// Cycles through a fixed list of payloads, one per fetch.
///
/// A `null` entry simulates a failed fetch (transport error), which makes
/// it easy to script disconnect/reconnect sequences.
pub struct ReplaySource {
    label: String,
    frames: Vec<Value>,
    cursor: Mutex<usize>,
}

impl ReplaySource {
    pub fn new(label: impl Into<String>, frames: Vec<Value>) -> Result<Self, ReplayError> {
        if frames.is_empty() {
            return Err(ReplayError::Empty);
        }
        Ok(Self {
            label: label.into(),
            frames,
            cursor: Mutex::new(0),
        })
    }

    /// Loads a script from a file holding a JSON array of payloads.
    pub fn from_file(path: &Path) -> Result<Self, ReplayError> {
        let text = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&format!("replay:{}", path.display()), &text)
    }

    pub fn from_json_str(label: &str, text: &str) -> Result<Self, ReplayError> {
        match serde_json::from_str::<Value>(text)? {
            Value::Array(frames) => Self::new(label, frames),
            _ => Err(ReplayError::Empty),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Index of the frame the next fetch will return.
    pub fn position(&self) -> usize {
        *self.cursor.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DataSource for ReplaySource {
    fn fetch(&self) -> Result<Value, AcquisitionError> {
        let frame = {
            let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
            let frame = self.frames[*cursor].clone();
            *cursor = (*cursor + 1) % self.frames.len();
            frame
        };

        match frame {
            Value::Null => Err(AcquisitionError::Transport("simulated fetch failure".to_string())),
            payload => Ok(payload),
        }
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
