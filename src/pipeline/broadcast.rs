//! Live event delivery
//!
//! Publishing is best-effort: the engine logs a failed publish and moves
//! on, it never fails an aggregation because of it.

use super::types::{AggregatedWindow, Anomaly, AnomalyType, SensorId, Severity, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

#[derive(Debug)]
pub enum BroadcastError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Closed(String),
}

impl From<std::io::Error> for BroadcastError {
    fn from(err: std::io::Error) -> Self {
        BroadcastError::Io(err)
    }
}

impl From<serde_json::Error> for BroadcastError {
    fn from(err: serde_json::Error) -> Self {
        BroadcastError::Serialization(err)
    }
}

impl std::fmt::Display for BroadcastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BroadcastError::Io(e) => write!(f, "IO error: {}", e),
            BroadcastError::Serialization(e) => write!(f, "Serialization error: {}", e),
            BroadcastError::Closed(msg) => write!(f, "Sink closed: {}", msg),
        }
    }
}

impl std::error::Error for BroadcastError {}

/// Message pushed to live subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    SensorData {
        sensor_id: SensorId,
        tier: Tier,
        timestamp: DateTime<Utc>,
        avg: f64,
        min: f64,
        max: f64,
        std: f64,
        count: u64,
    },
    AnomalyAlert {
        id: Option<i64>,
        sensor_id: SensorId,
        timestamp: DateTime<Utc>,
        anomaly_type: AnomalyType,
        severity: Severity,
        value: f64,
        description: String,
    },
}

impl LiveEvent {
    pub fn sensor_id(&self) -> SensorId {
        match self {
            LiveEvent::SensorData { sensor_id, .. } | LiveEvent::AnomalyAlert { sensor_id, .. } => *sensor_id,
        }
    }
}

impl From<&AggregatedWindow> for LiveEvent {
    fn from(w: &AggregatedWindow) -> Self {
        LiveEvent::SensorData {
            sensor_id: w.sensor_id,
            tier: w.tier,
            timestamp: w.window_start,
            avg: w.avg,
            min: w.min,
            max: w.max,
            std: w.std.unwrap_or(0.0),
            count: w.count,
        }
    }
}

impl From<&Anomaly> for LiveEvent {
    fn from(a: &Anomaly) -> Self {
        LiveEvent::AnomalyAlert {
            id: a.id,
            sensor_id: a.sensor_id,
            timestamp: a.timestamp,
            anomaly_type: a.anomaly_type,
            severity: a.severity,
            value: a.value,
            description: a.description.clone(),
        }
    }
}

/// Receiver of live aggregation and anomaly events
pub trait BroadcastSink: Send + Sync {
    fn publish(&self, event: LiveEvent) -> Result<(), BroadcastError>;

    /// Sink type for logging
    fn sink_type(&self) -> &'static str;

    fn publish_aggregation(&self, window: &AggregatedWindow) -> Result<(), BroadcastError> {
        self.publish(LiveEvent::from(window))
    }

    fn publish_anomaly(&self, anomaly: &Anomaly) -> Result<(), BroadcastError> {
        self.publish(LiveEvent::from(anomaly))
    }
}

/// In-process fan-out over a tokio broadcast channel
///
/// Having no subscribers is normal (nobody is watching) and not an error.
/// Slow subscribers lag and lose the oldest events.
#[derive(Clone)]
pub struct ChannelBroadcastSink {
    tx: broadcast::Sender<LiveEvent>,
}

impl ChannelBroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl BroadcastSink for ChannelBroadcastSink {
    fn publish(&self, event: LiveEvent) -> Result<(), BroadcastError> {
        if self.tx.send(event).is_err() {
            log::trace!("📭 No live subscribers, event dropped");
        }
        Ok(())
    }

    fn sink_type(&self) -> &'static str {
        "channel"
    }
}

/// Appends one JSON object per line
pub struct JsonlBroadcastSink {
    state: Mutex<JsonlState>,
}

struct JsonlState {
    writer: BufWriter<File>,
    last_flush: Instant,
}

impl JsonlBroadcastSink {
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path.as_ref())?;
        log::info!("📝 Writing live events to: {}", path.as_ref().display());
        Ok(Self {
            state: Mutex::new(JsonlState {
                writer: BufWriter::new(file),
                last_flush: Instant::now(),
            }),
        })
    }

    pub fn flush(&self) -> Result<(), BroadcastError> {
        let mut state = self.lock()?;
        state.writer.flush()?;
        state.last_flush = Instant::now();
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, JsonlState>, BroadcastError> {
        self.state
            .lock()
            .map_err(|_| BroadcastError::Closed("jsonl writer mutex poisoned".to_string()))
    }
}

impl BroadcastSink for JsonlBroadcastSink {
    fn publish(&self, event: LiveEvent) -> Result<(), BroadcastError> {
        let json = serde_json::to_string(&event)?;
        let mut state = self.lock()?;
        writeln!(state.writer, "{}", json)?;

        // Flush every 5 seconds
        if state.last_flush.elapsed() > Duration::from_secs(5) {
            state.writer.flush()?;
            state.last_flush = Instant::now();
        }
        Ok(())
    }

    fn sink_type(&self) -> &'static str {
        "jsonl"
    }
}

impl Drop for JsonlBroadcastSink {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Logs every event at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogBroadcastSink;

impl BroadcastSink for LogBroadcastSink {
    fn publish(&self, event: LiveEvent) -> Result<(), BroadcastError> {
        match &event {
            LiveEvent::SensorData {
                sensor_id,
                tier,
                avg,
                count,
                ..
            } => log::debug!("📡 sensor {} {} avg={:.3} n={}", sensor_id, tier, avg, count),
            LiveEvent::AnomalyAlert {
                sensor_id,
                anomaly_type,
                severity,
                description,
                ..
            } => log::debug!(
                "🚨 sensor {} {} ({}): {}",
                sensor_id,
                anomaly_type.as_str(),
                severity.as_str(),
                description
            ),
        }
        Ok(())
    }

    fn sink_type(&self) -> &'static str {
        "log"
    }
}

/// Publishes to every inner sink; reports the first failure after trying all
pub struct FanoutBroadcastSink {
    sinks: Vec<Arc<dyn BroadcastSink>>,
}

impl FanoutBroadcastSink {
    pub fn new(sinks: Vec<Arc<dyn BroadcastSink>>) -> Self {
        Self { sinks }
    }
}

impl BroadcastSink for FanoutBroadcastSink {
    fn publish(&self, event: LiveEvent) -> Result<(), BroadcastError> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.publish(event.clone()) {
                log::debug!("⚠️  {} sink publish failed: {}", sink.sink_type(), e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn sink_type(&self) -> &'static str {
        "fanout"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn sample_window() -> AggregatedWindow {
        AggregatedWindow {
            sensor_id: SensorId(3),
            tier: Tier::Second,
            window_start: Utc.with_ymd_and_hms(2024, 4, 1, 10, 0, 0).unwrap(),
            avg: 50.5,
            min: 49.0,
            max: 52.0,
            std: None,
            count: 60,
        }
    }

    #[test]
    fn test_sensor_data_json_shape() {
        let json = serde_json::to_value(LiveEvent::from(&sample_window())).unwrap();
        assert_eq!(json["type"], "sensor_data");
        assert_eq!(json["sensor_id"], 3);
        assert_eq!(json["tier"], "second");
        assert_eq!(json["std"], 0.0);
        assert_eq!(json["count"], 60);
    }

    #[test]
    fn test_anomaly_alert_json_shape() {
        let anomaly = Anomaly::new(
            SensorId(1),
            Utc.with_ymd_and_hms(2024, 4, 1, 10, 0, 0).unwrap(),
            AnomalyType::OutOfRange,
            Severity::High,
            150.0,
            "out".into(),
        );
        let json = serde_json::to_value(LiveEvent::from(&anomaly)).unwrap();
        assert_eq!(json["type"], "anomaly_alert");
        assert_eq!(json["anomaly_type"], "out_of_range");
        assert_eq!(json["severity"], "high");
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_to_subscriber() {
        let sink = ChannelBroadcastSink::new(8);
        // publishing without subscribers is fine
        sink.publish_aggregation(&sample_window()).unwrap();

        let mut rx = sink.subscribe();
        sink.publish_aggregation(&sample_window()).unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.sensor_id(), SensorId(3));
    }

    #[test]
    fn test_jsonl_sink_writes_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        {
            let sink = JsonlBroadcastSink::new(&path).unwrap();
            sink.publish_aggregation(&sample_window()).unwrap();
            sink.publish_aggregation(&sample_window()).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: LiveEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, LiveEvent::from(&sample_window()));
    }

    #[test]
    fn test_fanout_reaches_all_sinks() {
        let a = ChannelBroadcastSink::new(4);
        let b = ChannelBroadcastSink::new(4);
        let mut rx_a = a.subscribe();
        let mut rx_b = b.subscribe();

        let fanout = FanoutBroadcastSink::new(vec![Arc::new(a), Arc::new(b), Arc::new(LogBroadcastSink)]);
        fanout.publish_aggregation(&sample_window()).unwrap();

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }
}
