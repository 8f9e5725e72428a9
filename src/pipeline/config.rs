//! Pipeline configuration from environment variables
//!
//! `PipelineConfig::default()` carries the production defaults;
//! `from_env()` overrides them and validates the result. An invalid
//! configuration is fatal at startup.

use super::stats::CascadeMode;
use super::types::{SensorId, SensorRegistry, Tier};
use chrono::Duration;
use std::env;
use std::str::FromStr;

/// Longest horizon, lookback or threshold accepted from configuration
pub const MAX_SPAN_DAYS: i64 = 36_500;

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Per-store retention horizons. `None` means never purged.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionPolicy {
    pub raw: Option<Duration>,
    pub second: Option<Duration>,
    pub minute: Option<Duration>,
    pub hour: Option<Duration>,
}

impl RetentionPolicy {
    pub fn for_tier(&self, tier: Tier) -> Option<Duration> {
        match tier {
            Tier::Second => self.second,
            Tier::Minute => self.minute,
            Tier::Hour => self.hour,
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            raw: Some(Duration::days(7)),
            second: Some(Duration::days(30)),
            minute: Some(Duration::days(365)),
            hour: None,
        }
    }
}

/// Spike and out-of-range detection parameters
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyConfig {
    /// Trailing history of second windows used as the reference distribution
    pub lookback: Duration,
    /// Minimum number of reference windows before spikes are evaluated
    pub min_samples: usize,
    pub spike_sigma: f64,
    /// Deviation beyond which a spike is High rather than Medium
    pub high_severity_sigma: f64,
    pub value_min: f64,
    pub value_max: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            lookback: Duration::minutes(10),
            min_samples: 30,
            spike_sigma: 3.0,
            high_severity_sigma: 5.0,
            value_min: 0.0,
            value_max: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropoutConfig {
    /// A sensor silent for longer than this is a dropout candidate
    pub liveness: Duration,
    /// Window in which a repeated dropout for the same sensor is withheld
    pub suppression: Duration,
    /// Silence after which a sensor reads as Offline instead of Degraded
    pub offline_after: Duration,
}

impl Default for DropoutConfig {
    fn default() -> Self {
        Self {
            liveness: Duration::seconds(5),
            suppression: Duration::minutes(5),
            offline_after: Duration::seconds(60),
        }
    }
}

/// Cadences for the external periodic trigger
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub second_rollup_interval_ms: u64,
    pub minute_rollup_interval_ms: u64,
    pub hour_rollup_interval_ms: u64,
    pub retention_interval_ms: u64,
    pub dropout_interval_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            second_rollup_interval_ms: 1_000,
            minute_rollup_interval_ms: 60_000,
            hour_rollup_interval_ms: 3_600_000,
            retention_interval_ms: 86_400_000,
            dropout_interval_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub sensors: SensorRegistry,
    pub db_path: String,
    pub busy_timeout_ms: u64,
    pub retention: RetentionPolicy,
    pub anomaly: AnomalyConfig,
    pub dropout: DropoutConfig,
    pub cascade_mode: CascadeMode,
    pub schedule: ScheduleConfig,
    /// Append live events to this JSONL file in addition to the channel
    pub broadcast_jsonl_path: Option<String>,
    pub broadcast_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sensors: SensorRegistry::default(),
            db_path: "sensors.db".to_string(),
            busy_timeout_ms: 5_000,
            retention: RetentionPolicy::default(),
            anomaly: AnomalyConfig::default(),
            dropout: DropoutConfig::default(),
            cascade_mode: CascadeMode::default(),
            schedule: ScheduleConfig::default(),
            broadcast_jsonl_path: None,
            broadcast_capacity: 1_024,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables (defaults in parentheses):
    /// - `SENSOR_IDS` comma-separated list, or `SENSOR_COUNT` for `1..=N` (1..=12)
    /// - `PIPELINE_DB_PATH` (sensors.db), `SQLITE_BUSY_TIMEOUT_MS` (5000)
    /// - `RETENTION_RAW_DAYS` (7), `RETENTION_SECOND_DAYS` (30),
    ///   `RETENTION_MINUTE_DAYS` (365), `RETENTION_HOUR_DAYS` (none)
    /// - `ANOMALY_LOOKBACK_SECS` (600), `ANOMALY_MIN_SAMPLES` (30),
    ///   `SPIKE_SIGMA` (3.0), `SPIKE_HIGH_SIGMA` (5.0),
    ///   `VALUE_MIN` (0.0), `VALUE_MAX` (100.0)
    /// - `DROPOUT_LIVENESS_SECS` (5), `DROPOUT_SUPPRESSION_SECS` (300),
    ///   `STATUS_OFFLINE_SECS` (60)
    /// - `CASCADE_STD_MODE` (approximate)
    /// - `SECOND_ROLLUP_INTERVAL_MS` (1000), `MINUTE_ROLLUP_INTERVAL_MS` (60000),
    ///   `HOUR_ROLLUP_INTERVAL_MS` (3600000), `RETENTION_INTERVAL_SECS` (86400),
    ///   `DROPOUT_INTERVAL_MS` (10000)
    /// - `BROADCAST_JSONL_PATH` (unset), `BROADCAST_CHANNEL_CAPACITY` (1024)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let sensors = match env::var("SENSOR_IDS") {
            Ok(raw) => parse_sensor_ids(&raw)?,
            Err(_) => match parse_var::<u32>("SENSOR_COUNT")? {
                Some(count) => SensorRegistry::sequential(count),
                None => defaults.sensors,
            },
        };

        let retention = RetentionPolicy {
            raw: days_var("RETENTION_RAW_DAYS", defaults.retention.raw)?,
            second: days_var("RETENTION_SECOND_DAYS", defaults.retention.second)?,
            minute: days_var("RETENTION_MINUTE_DAYS", defaults.retention.minute)?,
            hour: days_var("RETENTION_HOUR_DAYS", defaults.retention.hour)?,
        };

        let anomaly = AnomalyConfig {
            lookback: secs_var("ANOMALY_LOOKBACK_SECS", defaults.anomaly.lookback)?,
            min_samples: parse_var("ANOMALY_MIN_SAMPLES")?.unwrap_or(defaults.anomaly.min_samples),
            spike_sigma: parse_var("SPIKE_SIGMA")?.unwrap_or(defaults.anomaly.spike_sigma),
            high_severity_sigma: parse_var("SPIKE_HIGH_SIGMA")?
                .unwrap_or(defaults.anomaly.high_severity_sigma),
            value_min: parse_var("VALUE_MIN")?.unwrap_or(defaults.anomaly.value_min),
            value_max: parse_var("VALUE_MAX")?.unwrap_or(defaults.anomaly.value_max),
        };

        let dropout = DropoutConfig {
            liveness: secs_var("DROPOUT_LIVENESS_SECS", defaults.dropout.liveness)?,
            suppression: secs_var("DROPOUT_SUPPRESSION_SECS", defaults.dropout.suppression)?,
            offline_after: secs_var("STATUS_OFFLINE_SECS", defaults.dropout.offline_after)?,
        };

        let cascade_mode = match env::var("CASCADE_STD_MODE") {
            Ok(raw) => CascadeMode::from_str(&raw).ok_or_else(|| {
                ConfigError::InvalidValue(format!(
                    "CASCADE_STD_MODE must be 'approximate' or 'pooled', got '{}'",
                    raw
                ))
            })?,
            Err(_) => defaults.cascade_mode,
        };

        let schedule = ScheduleConfig {
            second_rollup_interval_ms: parse_var("SECOND_ROLLUP_INTERVAL_MS")?
                .unwrap_or(defaults.schedule.second_rollup_interval_ms),
            minute_rollup_interval_ms: parse_var("MINUTE_ROLLUP_INTERVAL_MS")?
                .unwrap_or(defaults.schedule.minute_rollup_interval_ms),
            hour_rollup_interval_ms: parse_var("HOUR_ROLLUP_INTERVAL_MS")?
                .unwrap_or(defaults.schedule.hour_rollup_interval_ms),
            retention_interval_ms: parse_var::<u64>("RETENTION_INTERVAL_SECS")?
                .map(|s| s.saturating_mul(1_000))
                .unwrap_or(defaults.schedule.retention_interval_ms),
            dropout_interval_ms: parse_var("DROPOUT_INTERVAL_MS")?
                .unwrap_or(defaults.schedule.dropout_interval_ms),
        };

        let config = Self {
            sensors,
            db_path: env::var("PIPELINE_DB_PATH").unwrap_or(defaults.db_path),
            busy_timeout_ms: parse_var("SQLITE_BUSY_TIMEOUT_MS")?.unwrap_or(defaults.busy_timeout_ms),
            retention,
            anomaly,
            dropout,
            cascade_mode,
            schedule,
            broadcast_jsonl_path: env::var("BROADCAST_JSONL_PATH").ok().filter(|p| !p.is_empty()),
            broadcast_capacity: parse_var("BROADCAST_CHANNEL_CAPACITY")?
                .unwrap_or(defaults.broadcast_capacity),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sensors.is_empty() {
            return Err(invalid("sensor registry is empty"));
        }
        if self.db_path.trim().is_empty() {
            return Err(invalid("database path is empty"));
        }

        let max_span = Duration::days(MAX_SPAN_DAYS);
        for (name, horizon) in [
            ("raw", self.retention.raw),
            ("second", self.retention.second),
            ("minute", self.retention.minute),
            ("hour", self.retention.hour),
        ] {
            if let Some(h) = horizon {
                if h <= Duration::zero() {
                    return Err(invalid(&format!("{} retention horizon must be positive", name)));
                }
                if h > max_span {
                    return Err(invalid(&format!(
                        "{} retention horizon exceeds {} days (use 'none' to keep forever)",
                        name, MAX_SPAN_DAYS
                    )));
                }
            }
        }

        let a = &self.anomaly;
        if a.lookback <= Duration::zero() || a.lookback > max_span {
            return Err(invalid(&format!(
                "anomaly lookback must be positive and at most {} days",
                MAX_SPAN_DAYS
            )));
        }
        if a.min_samples == 0 {
            return Err(invalid("anomaly minimum sample count must be at least 1"));
        }
        if !(a.spike_sigma.is_finite() && a.spike_sigma > 0.0) {
            return Err(invalid("spike sigma threshold must be positive"));
        }
        if !(a.high_severity_sigma.is_finite() && a.high_severity_sigma >= a.spike_sigma) {
            return Err(invalid("high severity sigma must be >= spike sigma"));
        }
        if !(a.value_min.is_finite() && a.value_max.is_finite() && a.value_min < a.value_max) {
            return Err(invalid("value bounds must be finite with min < max"));
        }

        let d = &self.dropout;
        if d.liveness <= Duration::zero() {
            return Err(invalid("dropout liveness threshold must be positive"));
        }
        if d.suppression <= Duration::zero() {
            return Err(invalid("dropout suppression window must be positive"));
        }
        if [d.liveness, d.suppression, d.offline_after].iter().any(|span| *span > max_span) {
            return Err(invalid(&format!("dropout thresholds must be at most {} days", MAX_SPAN_DAYS)));
        }
        if d.offline_after < d.liveness {
            return Err(invalid("offline threshold must be >= liveness threshold"));
        }

        let s = &self.schedule;
        if [
            s.second_rollup_interval_ms,
            s.minute_rollup_interval_ms,
            s.hour_rollup_interval_ms,
            s.retention_interval_ms,
            s.dropout_interval_ms,
        ]
        .contains(&0)
        {
            return Err(invalid("scheduler intervals must be positive"));
        }
        if self.broadcast_capacity == 0 {
            return Err(invalid("broadcast channel capacity must be positive"));
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::InvalidValue(msg.to_string())
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(format!("{}='{}' could not be parsed", name, raw))),
        Err(_) => Ok(None),
    }
}

fn secs_var(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    match parse_var::<i64>(name)? {
        Some(secs) => Duration::try_seconds(secs)
            .ok_or_else(|| ConfigError::InvalidValue(format!("{}={} is out of range", name, secs))),
        None => Ok(default),
    }
}

/// `none` / `never` / `forever` disable purging for that store
fn days_var(name: &str, default: Option<Duration>) -> Result<Option<Duration>, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "none" | "never" | "forever" | "" => Ok(None),
            value => {
                let days = value
                    .parse::<i64>()
                    .map_err(|_| ConfigError::InvalidValue(format!("{}='{}' is not a day count", name, raw)))?;
                Duration::try_days(days)
                    .map(Some)
                    .ok_or_else(|| ConfigError::InvalidValue(format!("{}={} is out of range", name, days)))
            }
        },
        Err(_) => Ok(default),
    }
}

fn parse_sensor_ids(raw: &str) -> Result<SensorRegistry, ConfigError> {
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id: u32 = part
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("SENSOR_IDS contains '{}'", part)))?;
        if ids.contains(&SensorId(id)) {
            return Err(ConfigError::InvalidValue(format!("SENSOR_IDS lists {} twice", id)));
        }
        ids.push(SensorId(id));
    }
    Ok(SensorRegistry::new(ids))
}
