//! Anomaly detection with configurable thresholds
//!
//! Two independent detectors share the `Anomaly` entity:
//!
//! - **SpikeDetector** judges one freshly rolled-up second window against the
//!   trailing reference distribution of second-window averages. It raises
//!   **Spike** (deviation beyond `spike_sigma`) and **OutOfRange** (outside
//!   the absolute bounds). Both may fire for the same window.
//! - **DropoutDetector** flags a sensor whose latest raw sample is older
//!   than the liveness threshold, or that has never reported.
//!
//! Both are pure: fetching history and suppression lookups happen in the
//! engine, against the stores.

use super::config::{AnomalyConfig, DropoutConfig};
use super::stats::{mean, population_std};
use super::types::{Anomaly, AnomalyType, SensorId, Severity};
use chrono::{DateTime, Utc};

/// Outcome of the statistical part of an evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum SpikeVerdict {
    /// Not enough reference windows; no spike judgement is made
    InsufficientData { available: usize, required: usize },
    /// Reference windows are all identical; a sigma test is meaningless
    ZeroVariance { mean: f64 },
    Normal { mean: f64, std: f64, sigmas: f64 },
    Spike { mean: f64, std: f64, sigmas: f64, severity: Severity },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub verdict: SpikeVerdict,
    /// Spike and/or OutOfRange anomalies, not yet persisted
    pub anomalies: Vec<Anomaly>,
}

impl Evaluation {
    pub fn is_insufficient(&self) -> bool {
        matches!(self.verdict, SpikeVerdict::InsufficientData { .. })
    }
}

#[derive(Debug, Clone)]
pub struct SpikeDetector {
    config: AnomalyConfig,
}

impl SpikeDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(AnomalyConfig::default())
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Evaluate `value` (the new window's avg) against `history` (the avgs of
    /// the reference windows)
    ///
    /// The out-of-range rule does not depend on history and is applied even
    /// when the spike verdict is `InsufficientData` or `ZeroVariance`.
    pub fn evaluate(&self, sensor_id: SensorId, timestamp: DateTime<Utc>, value: f64, history: &[f64]) -> Evaluation {
        let verdict = self.spike_verdict(value, history);
        let mut anomalies = Vec::new();

        if let SpikeVerdict::Spike {
            mean,
            std,
            sigmas,
            severity,
        } = verdict
        {
            let band = self.config.spike_sigma * std;
            anomalies.push(
                Anomaly::new(
                    sensor_id,
                    timestamp,
                    AnomalyType::Spike,
                    severity,
                    value,
                    format!("Value {:.2} is {:.1} std devs from mean {:.2}", value, sigmas, mean),
                )
                .with_expected_range(mean - band, mean + band),
            );
        }

        if let Some(anomaly) = self.out_of_range(sensor_id, timestamp, value) {
            anomalies.push(anomaly);
        }

        Evaluation { verdict, anomalies }
    }

    fn spike_verdict(&self, value: f64, history: &[f64]) -> SpikeVerdict {
        let required = self.config.min_samples;
        if history.len() < required {
            return SpikeVerdict::InsufficientData {
                available: history.len(),
                required,
            };
        }

        // history is non-empty here since min_samples >= 1
        let (mean, std) = match (mean(history), population_std(history)) {
            (Some(m), Some(s)) => (m, s),
            _ => {
                return SpikeVerdict::InsufficientData {
                    available: history.len(),
                    required,
                }
            }
        };

        if std <= 0.0 {
            return SpikeVerdict::ZeroVariance { mean };
        }

        let deviation = (value - mean).abs();
        let sigmas = deviation / std;

        if deviation > self.config.spike_sigma * std {
            let severity = if deviation > self.config.high_severity_sigma * std {
                Severity::High
            } else {
                Severity::Medium
            };
            SpikeVerdict::Spike {
                mean,
                std,
                sigmas,
                severity,
            }
        } else {
            SpikeVerdict::Normal { mean, std, sigmas }
        }
    }

    fn out_of_range(&self, sensor_id: SensorId, timestamp: DateTime<Utc>, value: f64) -> Option<Anomaly> {
        let (lo, hi) = (self.config.value_min, self.config.value_max);
        if value >= lo && value <= hi {
            return None;
        }
        Some(
            Anomaly::new(
                sensor_id,
                timestamp,
                AnomalyType::OutOfRange,
                Severity::High,
                value,
                format!("Value {:.2} is outside range [{}, {}]", value, lo, hi),
            )
            .with_expected_range(lo, hi),
        )
    }
}

/// Silence check for one sensor
#[derive(Debug, Clone, PartialEq)]
pub enum Liveness {
    Live,
    /// Candidate dropout; `silent_for` is `None` when the sensor never reported
    Silent { silent_for: Option<chrono::Duration> },
}

#[derive(Debug, Clone)]
pub struct DropoutDetector {
    config: DropoutConfig,
}

impl DropoutDetector {
    pub fn new(config: DropoutConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(DropoutConfig::default())
    }

    pub fn config(&self) -> &DropoutConfig {
        &self.config
    }

    pub fn liveness(&self, now: DateTime<Utc>, last_seen: Option<DateTime<Utc>>) -> Liveness {
        match last_seen {
            None => Liveness::Silent { silent_for: None },
            Some(t) => {
                let elapsed = now - t;
                if elapsed > self.config.liveness {
                    Liveness::Silent {
                        silent_for: Some(elapsed),
                    }
                } else {
                    Liveness::Live
                }
            }
        }
    }

    /// Dropout anomaly for a candidate, before suppression is applied
    pub fn dropout_anomaly(&self, sensor_id: SensorId, now: DateTime<Utc>, silent_for: Option<chrono::Duration>) -> Anomaly {
        let description = match silent_for {
            Some(elapsed) => format!(
                "No data received for {:.0} seconds",
                elapsed.num_milliseconds() as f64 / 1_000.0
            ),
            None => format!("No data ever received from sensor {}", sensor_id),
        };
        Anomaly::new(sensor_id, now, AnomalyType::Dropout, Severity::High, 0.0, description)
    }

    /// Start of the suppression window ending at `now`
    pub fn suppression_since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.config.suppression)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}
