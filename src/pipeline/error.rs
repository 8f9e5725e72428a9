//! Error types for the rollup pipeline
//!
//! `StoreError` is what a storage adapter reports. `PipelineError` is what
//! the engine records per sensor; it never aborts work for other sensors.
//! Configuration problems are `ConfigError` (see `config`) and are fatal
//! at startup only.

use super::types::SensorId;

#[derive(Debug)]
pub enum StoreError {
    Database(rusqlite::Error),
    /// The store did not answer (connection lost, lock poisoned, busy timeout)
    Unavailable(String),
    /// A stored row could not be decoded
    InvalidRow(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            // busy timeout elapsed, nothing was written
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked) => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "Database error: {}", e),
            StoreError::Unavailable(msg) => write!(f, "Store unavailable: {}", msg),
            StoreError::InvalidRow(msg) => write!(f, "Invalid row: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum PipelineError {
    /// Reading samples or child windows failed for one sensor
    SourceUnavailable { sensor_id: SensorId, reason: String },
    /// An upsert did not reach the store; the window stays unwritten
    WriteFailed { sensor_id: SensorId, reason: String },
    /// A store call outside the per-sensor path failed
    Store(StoreError),
    /// A per-sensor task panicked or was cancelled
    TaskFailed(String),
}

impl PipelineError {
    pub fn source_unavailable(sensor_id: SensorId, err: StoreError) -> Self {
        PipelineError::SourceUnavailable {
            sensor_id,
            reason: err.to_string(),
        }
    }

    pub fn write(sensor_id: SensorId, err: StoreError) -> Self {
        PipelineError::WriteFailed {
            sensor_id,
            reason: err.to_string(),
        }
    }

    pub fn sensor_id(&self) -> Option<SensorId> {
        match self {
            PipelineError::SourceUnavailable { sensor_id, .. }
            | PipelineError::WriteFailed { sensor_id, .. } => Some(*sensor_id),
            _ => None,
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        PipelineError::Store(err)
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::SourceUnavailable { sensor_id, reason } => {
                write!(f, "Source unavailable for sensor {}: {}", sensor_id, reason)
            }
            PipelineError::WriteFailed { sensor_id, reason } => {
                write!(f, "Write failed for sensor {}: {}", sensor_id, reason)
            }
            PipelineError::Store(e) => write!(f, "{}", e),
            PipelineError::TaskFailed(msg) => write!(f, "Sensor task failed: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}
