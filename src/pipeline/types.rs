//! Core data structures for the tiered rollup pipeline
//!
//! Every timestamp is a `chrono::DateTime<Utc>`; the SQLite adapter stores
//! them as integer microseconds since the Unix epoch.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a physical sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorId(pub u32);

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SensorId {
    fn from(id: u32) -> Self {
        SensorId(id)
    }
}

/// Ordered, duplicate-free set of sensors the engine iterates over
///
/// Injected through configuration so fleet size is a deployment concern,
/// not something the rollup code knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorRegistry {
    sensors: BTreeSet<SensorId>,
}

impl SensorRegistry {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SensorId>,
    {
        Self {
            sensors: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Sensors `1..=count`
    pub fn sequential(count: u32) -> Self {
        Self::new(1..=count)
    }

    pub fn iter(&self) -> impl Iterator<Item = SensorId> + '_ {
        self.sensors.iter().copied()
    }

    pub fn contains(&self, id: SensorId) -> bool {
        self.sensors.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self::sequential(12)
    }
}

/// Aggregation resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Second,
    Minute,
    Hour,
}

/// What a tier is rolled up from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierSource {
    Raw,
    Tier(Tier),
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Second => "second",
            Tier::Minute => "minute",
            Tier::Hour => "hour",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "second" => Some(Tier::Second),
            "minute" => Some(Tier::Minute),
            "hour" => Some(Tier::Hour),
            _ => None,
        }
    }

    pub fn granularity(&self) -> Duration {
        match self {
            Tier::Second => Duration::seconds(1),
            Tier::Minute => Duration::minutes(1),
            Tier::Hour => Duration::hours(1),
        }
    }

    /// Tier-N windows are built only from tier-(N-1) windows, or from raw
    /// samples for the Second tier.
    pub fn source(&self) -> TierSource {
        match self {
            Tier::Second => TierSource::Raw,
            Tier::Minute => TierSource::Tier(Tier::Second),
            Tier::Hour => TierSource::Tier(Tier::Minute),
        }
    }

    pub fn all() -> [Tier; 3] {
        [Tier::Second, Tier::Minute, Tier::Hour]
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single raw reading. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub sensor_id: SensorId,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(sensor_id: impl Into<SensorId>, timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            timestamp,
            value,
        }
    }
}

/// Summary statistics for one sensor over one aligned window
///
/// Keyed by `(sensor_id, tier, window_start)`; writes are upserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedWindow {
    pub sensor_id: SensorId,
    pub tier: Tier,
    pub window_start: DateTime<Utc>,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub std: Option<f64>,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Spike,
    OutOfRange,
    Dropout,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::Spike => "spike",
            AnomalyType::OutOfRange => "out_of_range",
            AnomalyType::Dropout => "dropout",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "spike" => Some(AnomalyType::Spike),
            "out_of_range" => Some(AnomalyType::OutOfRange),
            "dropout" => Some(AnomalyType::Dropout),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedRange {
    pub min: f64,
    pub max: f64,
}

/// A detected abnormal reading or outage
///
/// `id` is assigned by the anomaly store and is `None` until persisted.
/// Only `acknowledged` is ever mutated after creation, and only by an
/// external acknowledgment action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: Option<i64>,
    pub sensor_id: SensorId,
    pub timestamp: DateTime<Utc>,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub value: f64,
    pub expected_range: Option<ExpectedRange>,
    pub description: String,
    pub acknowledged: bool,
}

impl Anomaly {
    pub fn new(
        sensor_id: SensorId,
        timestamp: DateTime<Utc>,
        anomaly_type: AnomalyType,
        severity: Severity,
        value: f64,
        description: String,
    ) -> Self {
        Self {
            id: None,
            sensor_id,
            timestamp,
            anomaly_type,
            severity,
            value,
            expected_range: None,
            description,
            acknowledged: false,
        }
    }

    pub fn with_expected_range(mut self, min: f64, max: f64) -> Self {
        self.expected_range = Some(ExpectedRange { min, max });
        self
    }
}
