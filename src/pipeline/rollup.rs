//! Tier rollup for one sensor and one completed window
//!
//! Second windows are built from raw samples; Minute and Hour windows only
//! from the tier directly below (aggregate-of-aggregates, see `stats`).
//! Nothing is written here: the engine upserts the returned window.

use super::db::{SampleSource, TierStore};
use super::error::PipelineError;
use super::stats::{summarize_children, summarize_samples, CascadeMode, WindowSummary};
use super::types::{AggregatedWindow, SensorId, Tier, TierSource};
use super::windows::TimeWindow;

/// Result of one rollup entry point invocation
#[derive(Debug)]
pub struct RollupReport {
    pub tier: Tier,
    pub window: TimeWindow,
    /// Sensors whose window was upserted
    pub written: usize,
    /// Sensors with no source data (silence, nothing written)
    pub empty: usize,
    /// Anomalies persisted as a side effect (Second tier only)
    pub anomalies: usize,
    pub failures: Vec<PipelineError>,
    pub elapsed_ms: u128,
}

impl RollupReport {
    pub fn new(tier: Tier, window: TimeWindow) -> Self {
        Self {
            tier,
            window,
            written: 0,
            empty: 0,
            anomalies: 0,
            failures: Vec::new(),
            elapsed_ms: 0,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn record(&mut self, outcome: Result<SensorRollup, PipelineError>) {
        match outcome {
            Ok(SensorRollup::Written { anomalies }) => {
                self.written += 1;
                self.anomalies += anomalies;
            }
            Ok(SensorRollup::Empty) => self.empty += 1,
            Err(e) => self.failures.push(e),
        }
    }
}

/// Per-sensor outcome inside one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorRollup {
    Written { anomalies: usize },
    Empty,
}

/// Read the source records for `window` and summarize them
///
/// `Ok(None)` means the sensor was silent for the whole window.
pub async fn aggregate_window(
    samples: &dyn SampleSource,
    tiers: &dyn TierStore,
    cascade_mode: CascadeMode,
    sensor_id: SensorId,
    tier: Tier,
    window: TimeWindow,
) -> Result<Option<AggregatedWindow>, PipelineError> {
    let summary = match tier.source() {
        TierSource::Raw => {
            let raw = samples
                .fetch_samples(sensor_id, window)
                .await
                .map_err(|e| PipelineError::source_unavailable(sensor_id, e))?;
            summarize_samples(&raw)
        }
        TierSource::Tier(child) => {
            let children = tiers
                .fetch_windows(sensor_id, child, window)
                .await
                .map_err(|e| PipelineError::source_unavailable(sensor_id, e))?;
            summarize_children(&children, cascade_mode)
        }
    };

    // a zero-count window is silence, never a record
    Ok(summary
        .filter(|s| s.count > 0)
        .map(|s| into_window(sensor_id, tier, window, s)))
}

fn into_window(sensor_id: SensorId, tier: Tier, window: TimeWindow, summary: WindowSummary) -> AggregatedWindow {
    AggregatedWindow {
        sensor_id,
        tier,
        window_start: window.start,
        avg: summary.avg,
        min: summary.min,
        max: summary.max,
        std: Some(summary.std),
        count: summary.count,
    }
}
