//! Derived per-sensor connectivity status
//!
//! Nothing here is persisted: status is recomputed from the latest raw
//! sample every time it is read.
//!
//! ```text
//! Online   last sample younger than the liveness threshold (5s)
//! Degraded younger than the offline threshold (60s)
//! Offline  60s or older
//! NoData   never reported
//! ```

use super::config::DropoutConfig;
use super::types::{Sample, SensorId};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    Online,
    Degraded,
    Offline,
    NoData,
}

impl SensorStatus {
    pub fn derive(now: DateTime<Utc>, last_seen: Option<DateTime<Utc>>, thresholds: &DropoutConfig) -> Self {
        let Some(t) = last_seen else {
            return SensorStatus::NoData;
        };
        let elapsed = now - t;
        if elapsed < thresholds.liveness {
            SensorStatus::Online
        } else if elapsed < thresholds.offline_after {
            SensorStatus::Degraded
        } else {
            SensorStatus::Offline
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStatus::Online => "online",
            SensorStatus::Degraded => "degraded",
            SensorStatus::Offline => "offline",
            SensorStatus::NoData => "no_data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorStatusReport {
    pub sensor_id: SensorId,
    pub status: SensorStatus,
    pub last_reading_time: Option<DateTime<Utc>>,
    pub last_value: Option<f64>,
}

impl SensorStatusReport {
    pub fn from_latest(sensor_id: SensorId, now: DateTime<Utc>, latest: Option<&Sample>, thresholds: &DropoutConfig) -> Self {
        Self {
            sensor_id,
            status: SensorStatus::derive(now, latest.map(|s| s.timestamp), thresholds),
            last_reading_time: latest.map(|s| s.timestamp),
            last_value: latest.map(|s| s.value),
        }
    }
}
