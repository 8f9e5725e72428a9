//! Pipeline Engine - entry points invoked by the external scheduler
//!
//! ```text
//! run_second_rollup ─┬─ per sensor: raw samples → Second window → upsert
//!                    │        └─ publish → evaluate_spike → anomalies
//! run_minute_rollup ─┼─ per sensor: Second windows → Minute window → upsert
//! run_hour_rollup ───┘─ per sensor: Minute windows → Hour window → upsert
//! run_dropout_sweep ─── per sensor: latest sample → liveness → Dropout
//! run_retention_sweep ─ per store: delete rows older than the horizon
//! ```
//!
//! Every entry point reads `now` once from the injected clock. Per-sensor
//! work fans out over a `JoinSet` and the invocation waits for all of it;
//! one sensor failing never stops the others. The engine holds no mutable
//! state, so clones can run concurrently from separate scheduler tasks.

use super::broadcast::BroadcastSink;
use super::clock::{Clock, SystemClock};
use super::config::PipelineConfig;
use super::db::{AnomalyFilter, AnomalyStore, SampleSource, SqliteStore, TierStore};
use super::detector::{DropoutDetector, Evaluation, Liveness, SpikeDetector};
use super::error::PipelineError;
use super::retention::{RetentionManager, RetentionReport};
use super::rollup::{aggregate_window, RollupReport, SensorRollup};
use super::status::SensorStatusReport;
use super::types::{Anomaly, SensorId, Tier};
use super::windows::{completed_window, lookback_window, TimeWindow};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

/// Result of one dropout sweep
#[derive(Debug, Default)]
pub struct DropoutReport {
    pub raised: usize,
    /// Silent sensors that already had a recent Dropout anomaly
    pub suppressed: usize,
    pub live: usize,
    pub failures: Vec<PipelineError>,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DropoutCheck {
    Live,
    Raised,
    Suppressed,
}

#[derive(Clone)]
pub struct PipelineEngine {
    config: Arc<PipelineConfig>,
    samples: Arc<dyn SampleSource>,
    tiers: Arc<dyn TierStore>,
    anomalies: Arc<dyn AnomalyStore>,
    sink: Arc<dyn BroadcastSink>,
    clock: Arc<dyn Clock>,
    spike: SpikeDetector,
    dropout: DropoutDetector,
    retention: RetentionManager,
}

impl PipelineEngine {
    pub fn new(
        config: PipelineConfig,
        samples: Arc<dyn SampleSource>,
        tiers: Arc<dyn TierStore>,
        anomalies: Arc<dyn AnomalyStore>,
        sink: Arc<dyn BroadcastSink>,
    ) -> Self {
        Self {
            spike: SpikeDetector::new(config.anomaly.clone()),
            dropout: DropoutDetector::new(config.dropout.clone()),
            retention: RetentionManager::new(config.retention.clone()),
            config: Arc::new(config),
            samples,
            tiers,
            anomalies,
            sink,
            clock: Arc::new(SystemClock),
        }
    }

    /// One SQLite store backing samples, tiers and anomalies
    pub fn with_sqlite(config: PipelineConfig, store: Arc<SqliteStore>, sink: Arc<dyn BroadcastSink>) -> Self {
        Self::new(config, store.clone(), store.clone(), store, sink)
    }

    /// Replace the time source (tests, replays)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn run_second_rollup(&self) -> RollupReport {
        self.run_rollup(Tier::Second).await
    }

    pub async fn run_minute_rollup(&self) -> RollupReport {
        self.run_rollup(Tier::Minute).await
    }

    pub async fn run_hour_rollup(&self) -> RollupReport {
        self.run_rollup(Tier::Hour).await
    }

    /// Aggregate the most recently completed window of `tier` for every sensor
    pub async fn run_rollup(&self, tier: Tier) -> RollupReport {
        let started = Instant::now();
        let window = completed_window(tier, self.clock.now());
        let mut report = RollupReport::new(tier, window);

        let outcomes = self
            .fan_out(move |engine, sensor_id| async move { engine.rollup_sensor(tier, window, sensor_id).await })
            .await;
        for outcome in outcomes {
            if let Err(e) = &outcome {
                log::warn!("⚠️  {} rollup: {}", tier, e);
            }
            report.record(outcome);
        }
        report.elapsed_ms = started.elapsed().as_millis();

        let summary = format!(
            "{} rollup [{}]: {} written, {} empty, {} anomalies, {} failed ({}ms)",
            tier,
            window.start.format("%Y-%m-%d %H:%M:%S"),
            report.written,
            report.empty,
            report.anomalies,
            report.failures.len(),
            report.elapsed_ms
        );
        // the Second tier fires every second
        if tier == Tier::Second {
            log::debug!("✅ {}", summary);
        } else {
            log::info!("✅ {}", summary);
        }
        report
    }

    async fn rollup_sensor(
        &self,
        tier: Tier,
        window: TimeWindow,
        sensor_id: SensorId,
    ) -> Result<SensorRollup, PipelineError> {
        let aggregated = aggregate_window(
            self.samples.as_ref(),
            self.tiers.as_ref(),
            self.config.cascade_mode,
            sensor_id,
            tier,
            window,
        )
        .await?;

        let Some(aggregated) = aggregated else {
            return Ok(SensorRollup::Empty);
        };

        self.tiers
            .upsert_window(&aggregated)
            .await
            .map_err(|e| PipelineError::write(sensor_id, e))?;

        if let Err(e) = self.sink.publish_aggregation(&aggregated) {
            log::debug!("⚠️  Broadcast failed for sensor {} ({}): {}", sensor_id, tier, e);
        }

        let anomalies = if tier == Tier::Second {
            self.detect_anomalies(sensor_id, aggregated.window_start, aggregated.avg)
                .await
        } else {
            0
        };

        Ok(SensorRollup::Written { anomalies })
    }

    /// Evaluation side effect of a Second rollup. Never fails the rollup.
    async fn detect_anomalies(&self, sensor_id: SensorId, window_start: DateTime<Utc>, value: f64) -> usize {
        let evaluation = match self.evaluate_spike(sensor_id, window_start, value).await {
            Ok(evaluation) => evaluation,
            Err(e) => {
                log::warn!("⚠️  Anomaly evaluation skipped: {}", e);
                return 0;
            }
        };

        let mut recorded = 0;
        for anomaly in evaluation.anomalies {
            if self.record_anomaly(anomaly).await.is_some() {
                recorded += 1;
            }
        }
        recorded
    }

    /// Spike and out-of-range evaluation of `value` for the Second window
    /// starting at `window_start`
    ///
    /// The reference distribution is the Second windows in
    /// `[window_start - lookback, window_start)`. Returned anomalies are not
    /// persisted.
    pub async fn evaluate_spike(
        &self,
        sensor_id: SensorId,
        window_start: DateTime<Utc>,
        value: f64,
    ) -> Result<Evaluation, PipelineError> {
        let lookback = lookback_window(window_start, self.spike.config().lookback);
        let history: Vec<f64> = self
            .tiers
            .fetch_windows(sensor_id, Tier::Second, lookback)
            .await
            .map_err(|e| PipelineError::source_unavailable(sensor_id, e))?
            .iter()
            .map(|w| w.avg)
            .collect();

        let evaluation = self.spike.evaluate(sensor_id, window_start, value, &history);
        if evaluation.is_insufficient() {
            log::trace!(
                "sensor {}: {} reference windows, spike check skipped",
                sensor_id,
                history.len()
            );
        }
        Ok(evaluation)
    }

    /// Persist then publish. Returns the stored anomaly, or `None` if the
    /// store rejected it.
    async fn record_anomaly(&self, mut anomaly: Anomaly) -> Option<Anomaly> {
        match self.anomalies.create_anomaly(&anomaly).await {
            Ok(id) => anomaly.id = Some(id),
            Err(e) => {
                log::warn!(
                    "⚠️  Failed to store {} anomaly for sensor {}: {}",
                    anomaly.anomaly_type.as_str(),
                    anomaly.sensor_id,
                    e
                );
                return None;
            }
        }

        log::info!(
            "🚨 {} {} on sensor {}: {}",
            anomaly.severity.as_str(),
            anomaly.anomaly_type.as_str(),
            anomaly.sensor_id,
            anomaly.description
        );
        if let Err(e) = self.sink.publish_anomaly(&anomaly) {
            log::debug!("⚠️  Anomaly broadcast failed for sensor {}: {}", anomaly.sensor_id, e);
        }
        Some(anomaly)
    }

    /// Raise a Dropout anomaly for every silent sensor not already flagged
    /// within the suppression window
    pub async fn run_dropout_sweep(&self) -> DropoutReport {
        let started = Instant::now();
        let now = self.clock.now();
        let mut report = DropoutReport::default();

        let outcomes = self
            .fan_out(move |engine, sensor_id| async move { engine.check_dropout(sensor_id, now).await })
            .await;
        for outcome in outcomes {
            match outcome {
                Ok(DropoutCheck::Live) => report.live += 1,
                Ok(DropoutCheck::Raised) => report.raised += 1,
                Ok(DropoutCheck::Suppressed) => report.suppressed += 1,
                Err(e) => {
                    log::warn!("⚠️  Dropout check: {}", e);
                    report.failures.push(e);
                }
            }
        }
        report.elapsed_ms = started.elapsed().as_millis();

        if report.raised > 0 || !report.failures.is_empty() {
            log::info!(
                "📡 Dropout sweep: {} raised, {} suppressed, {} live, {} failed ({}ms)",
                report.raised,
                report.suppressed,
                report.live,
                report.failures.len(),
                report.elapsed_ms
            );
        } else {
            log::debug!(
                "📡 Dropout sweep: {} live, {} suppressed ({}ms)",
                report.live,
                report.suppressed,
                report.elapsed_ms
            );
        }
        report
    }

    async fn check_dropout(&self, sensor_id: SensorId, now: DateTime<Utc>) -> Result<DropoutCheck, PipelineError> {
        let latest = self
            .samples
            .latest_sample(sensor_id)
            .await
            .map_err(|e| PipelineError::source_unavailable(sensor_id, e))?;

        let silent_for = match self.dropout.liveness(now, latest.map(|s| s.timestamp)) {
            Liveness::Live => return Ok(DropoutCheck::Live),
            Liveness::Silent { silent_for } => silent_for,
        };

        let since = self.dropout.suppression_since(now);
        let already_flagged = self
            .anomalies
            .exists_recent_dropout(sensor_id, since)
            .await
            .map_err(|e| PipelineError::source_unavailable(sensor_id, e))?;
        if already_flagged {
            return Ok(DropoutCheck::Suppressed);
        }

        let mut anomaly = self.dropout.dropout_anomaly(sensor_id, now, silent_for);
        let id = self
            .anomalies
            .create_anomaly(&anomaly)
            .await
            .map_err(|e| PipelineError::write(sensor_id, e))?;
        anomaly.id = Some(id);

        log::warn!("🔇 Sensor {} dropout: {}", sensor_id, anomaly.description);
        if let Err(e) = self.sink.publish_anomaly(&anomaly) {
            log::debug!("⚠️  Dropout broadcast failed for sensor {}: {}", sensor_id, e);
        }
        Ok(DropoutCheck::Raised)
    }

    pub async fn run_retention_sweep(&self) -> RetentionReport {
        self.retention_pass(false).await
    }

    /// Count what a sweep at the current time would delete
    pub async fn preview_retention(&self) -> RetentionReport {
        self.retention_pass(true).await
    }

    async fn retention_pass(&self, dry_run: bool) -> RetentionReport {
        let started = Instant::now();
        let now = self.clock.now();
        let report = self
            .retention
            .sweep(self.samples.as_ref(), self.tiers.as_ref(), now, dry_run)
            .await;

        log::info!(
            "🧹 Retention {}: {} rows {} ({}ms)",
            if dry_run { "preview" } else { "sweep" },
            report.total_purged(),
            if dry_run { "eligible" } else { "deleted" },
            started.elapsed().as_millis()
        );
        for entry in &report.entries {
            log::debug!("   ├─ {}: {:?}", entry.target, entry.outcome);
        }
        report
    }

    /// Derived status of every sensor, in registry order
    pub async fn sensor_statuses(&self) -> Result<Vec<SensorStatusReport>, PipelineError> {
        let now = self.clock.now();
        let mut reports = Vec::with_capacity(self.config.sensors.len());
        for sensor_id in self.config.sensors.iter() {
            let latest = self
                .samples
                .latest_sample(sensor_id)
                .await
                .map_err(|e| PipelineError::source_unavailable(sensor_id, e))?;
            reports.push(SensorStatusReport::from_latest(
                sensor_id,
                now,
                latest.as_ref(),
                &self.config.dropout,
            ));
        }
        Ok(reports)
    }

    /// External acknowledgment action. `false` if the id is unknown.
    pub async fn acknowledge_anomaly(&self, id: i64) -> Result<bool, PipelineError> {
        Ok(self.anomalies.acknowledge_anomaly(id).await?)
    }

    pub async fn list_anomalies(&self, filter: &AnomalyFilter) -> Result<Vec<Anomaly>, PipelineError> {
        Ok(self.anomalies.list_anomalies(filter).await?)
    }

    /// Run `task` once per registered sensor and wait for all of them
    ///
    /// A panicking task is reported as `TaskFailed`; the others still finish.
    async fn fan_out<T, F, Fut>(&self, task: F) -> Vec<Result<T, PipelineError>>
    where
        T: Send + 'static,
        F: Fn(PipelineEngine, SensorId) -> Fut,
        Fut: Future<Output = Result<T, PipelineError>> + Send + 'static,
    {
        let mut set = JoinSet::new();
        for sensor_id in self.config.sensors.iter() {
            set.spawn(task(self.clone(), sensor_id));
        }

        let mut results = Vec::with_capacity(self.config.sensors.len());
        while let Some(joined) = set.join_next().await {
            results.push(joined.unwrap_or_else(|e| Err(PipelineError::TaskFailed(e.to_string()))));
        }
        results
    }
}
