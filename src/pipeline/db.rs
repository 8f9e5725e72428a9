//! Store traits and the SQLite adapter
//!
//! The engine only sees the traits:
//! - `SampleSource` - raw samples (fetch by sensor + range, latest, purge)
//! - `TierStore` - aggregated windows for all tiers (fetch, upsert, purge)
//! - `AnomalyStore` - anomalies (create, dropout suppression query, ack)
//!
//! `SqliteStore` implements all three on one connection. Schema lives in
//! `/sql/` and is applied idempotently by `run_schema_migrations`.
//! Timestamps are stored as integer microseconds since the Unix epoch.
//!
//! Bounded waiting is the adapter's job: the connection carries a busy
//! timeout, after which a locked database surfaces as `StoreError::Unavailable`.
//! Concurrent upserts of the same key are resolved by `ON CONFLICT DO UPDATE`.

use super::error::StoreError;
use super::types::{AggregatedWindow, Anomaly, AnomalyType, ExpectedRange, Sample, SensorId, Severity, Tier};
use super::windows::TimeWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Schema files, applied in order
const SCHEMA: &[(&str, &str)] = &[
    ("00_sensor_samples.sql", include_str!("../../sql/00_sensor_samples.sql")),
    ("01_aggregated_windows.sql", include_str!("../../sql/01_aggregated_windows.sql")),
    ("02_anomalies.sql", include_str!("../../sql/02_anomalies.sql")),
];

#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Samples with `window.start <= timestamp < window.end`, oldest first
    async fn fetch_samples(&self, sensor_id: SensorId, window: TimeWindow) -> Result<Vec<Sample>, StoreError>;

    /// Most recent sample for a sensor, if it has ever reported
    async fn latest_sample(&self, sensor_id: SensorId) -> Result<Option<Sample>, StoreError>;

    /// Delete samples strictly older than `cutoff`, returning how many went
    async fn delete_samples_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn count_samples_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait TierStore: Send + Sync {
    /// Windows of `tier` with `window.start <= window_start < window.end`, oldest first
    async fn fetch_windows(
        &self,
        sensor_id: SensorId,
        tier: Tier,
        window: TimeWindow,
    ) -> Result<Vec<AggregatedWindow>, StoreError>;

    /// Insert or overwrite the row keyed by `(sensor_id, tier, window_start)`
    async fn upsert_window(&self, window: &AggregatedWindow) -> Result<(), StoreError>;

    /// Delete windows of `tier` starting strictly before `cutoff`
    async fn delete_older_than(&self, tier: Tier, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn count_older_than(&self, tier: Tier, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Query filter for `AnomalyStore::list_anomalies`
#[derive(Debug, Clone, Default)]
pub struct AnomalyFilter {
    pub sensor_id: Option<SensorId>,
    pub anomaly_type: Option<AnomalyType>,
    pub severity: Option<Severity>,
    pub unacknowledged_only: bool,
    pub limit: Option<usize>,
}

#[async_trait]
pub trait AnomalyStore: Send + Sync {
    /// Persist an anomaly and return its id
    async fn create_anomaly(&self, anomaly: &Anomaly) -> Result<i64, StoreError>;

    /// Whether a Dropout anomaly exists for the sensor at or after `since`
    async fn exists_recent_dropout(&self, sensor_id: SensorId, since: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Mark an anomaly as acknowledged. `false` if no such id.
    async fn acknowledge_anomaly(&self, id: i64) -> Result<bool, StoreError>;

    /// Newest first
    async fn list_anomalies(&self, filter: &AnomalyFilter) -> Result<Vec<Anomaly>, StoreError>;
}

/// Apply every schema file (all use IF NOT EXISTS)
pub fn run_schema_migrations(conn: &Connection) -> Result<(), StoreError> {
    for (name, sql) in SCHEMA {
        log::debug!("   ├─ Executing: {}", name);
        conn.execute_batch(sql)?;
    }
    log::debug!("✅ Schema migrations applied ({} files)", SCHEMA.len());
    Ok(())
}

/// WAL for concurrent readers alongside the rollup writer, plus the busy timeout
pub fn apply_pragmas(conn: &Connection, busy_timeout: Duration) -> Result<(), StoreError> {
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(busy_timeout)?;
    log::debug!("📊 SQLite journal_mode={}, busy_timeout={}ms", mode, busy_timeout.as_millis());
    Ok(())
}

/// SQLite implementation of all three store traits
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file and apply the schema
    pub fn open(db_path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path.as_ref())?;
        apply_pragmas(&conn, busy_timeout)?;
        run_schema_migrations(&conn)?;
        log::info!("✅ SQLite store opened: {}", db_path.as_ref().display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        run_schema_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection mutex poisoned".to_string()))
    }

    /// Bulk insert raw samples in one transaction
    ///
    /// Ingestion is owned by an external adapter; this is the write path
    /// it (and the simulator) use.
    pub fn insert_samples(&self, samples: &[Sample]) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO sensor_samples (sensor_id, ts_us, value) VALUES (?1, ?2, ?3)",
            )?;
            for sample in samples {
                stmt.execute(params![sample.sensor_id.0, sample.timestamp.timestamp_micros(), sample.value])?;
            }
        }
        tx.commit()?;
        Ok(samples.len())
    }
}

fn from_micros(us: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(us).ok_or_else(|| StoreError::InvalidRow(format!("timestamp out of range: {}", us)))
}

#[async_trait]
impl SampleSource for SqliteStore {
    async fn fetch_samples(&self, sensor_id: SensorId, window: TimeWindow) -> Result<Vec<Sample>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT ts_us, value FROM sensor_samples
             WHERE sensor_id = ?1 AND ts_us >= ?2 AND ts_us < ?3
             ORDER BY ts_us ASC",
        )?;
        let rows = stmt.query_map(
            params![sensor_id.0, window.start.timestamp_micros(), window.end.timestamp_micros()],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)),
        )?;

        let mut samples = Vec::new();
        for row in rows {
            let (ts_us, value) = row?;
            samples.push(Sample {
                sensor_id,
                timestamp: from_micros(ts_us)?,
                value,
            });
        }
        Ok(samples)
    }

    async fn latest_sample(&self, sensor_id: SensorId) -> Result<Option<Sample>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT ts_us, value FROM sensor_samples
                 WHERE sensor_id = ?1
                 ORDER BY ts_us DESC LIMIT 1",
                params![sensor_id.0],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)),
            )
            .optional()?;

        match row {
            Some((ts_us, value)) => Ok(Some(Sample {
                sensor_id,
                timestamp: from_micros(ts_us)?,
                value,
            })),
            None => Ok(None),
        }
    }

    async fn delete_samples_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM sensor_samples WHERE ts_us < ?1",
            params![cutoff.timestamp_micros()],
        )?;
        Ok(deleted as u64)
    }

    async fn count_samples_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sensor_samples WHERE ts_us < ?1",
            params![cutoff.timestamp_micros()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[async_trait]
impl TierStore for SqliteStore {
    async fn fetch_windows(
        &self,
        sensor_id: SensorId,
        tier: Tier,
        window: TimeWindow,
    ) -> Result<Vec<AggregatedWindow>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT window_start_us, avg, min, max, std, count FROM aggregated_windows
             WHERE sensor_id = ?1 AND tier = ?2 AND window_start_us >= ?3 AND window_start_us < ?4
             ORDER BY window_start_us ASC",
        )?;
        let rows = stmt.query_map(
            params![
                sensor_id.0,
                tier.as_str(),
                window.start.timestamp_micros(),
                window.end.timestamp_micros()
            ],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            },
        )?;

        let mut windows = Vec::new();
        for row in rows {
            let (start_us, avg, min, max, std, count) = row?;
            windows.push(AggregatedWindow {
                sensor_id,
                tier,
                window_start: from_micros(start_us)?,
                avg,
                min,
                max,
                std,
                count: u64::try_from(count)
                    .map_err(|_| StoreError::InvalidRow(format!("negative count: {}", count)))?,
            });
        }
        Ok(windows)
    }

    async fn upsert_window(&self, window: &AggregatedWindow) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO aggregated_windows (
                sensor_id, tier, window_start_us, avg, min, max, std, count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(sensor_id, tier, window_start_us) DO UPDATE SET
                avg = excluded.avg,
                min = excluded.min,
                max = excluded.max,
                std = excluded.std,
                count = excluded.count
            "#,
            params![
                window.sensor_id.0,
                window.tier.as_str(),
                window.window_start.timestamp_micros(),
                window.avg,
                window.min,
                window.max,
                window.std,
                i64::try_from(window.count).unwrap_or(i64::MAX),
            ],
        )?;
        Ok(())
    }

    async fn delete_older_than(&self, tier: Tier, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM aggregated_windows WHERE tier = ?1 AND window_start_us < ?2",
            params![tier.as_str(), cutoff.timestamp_micros()],
        )?;
        Ok(deleted as u64)
    }

    async fn count_older_than(&self, tier: Tier, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM aggregated_windows WHERE tier = ?1 AND window_start_us < ?2",
            params![tier.as_str(), cutoff.timestamp_micros()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

type AnomalyRow = (i64, u32, i64, String, String, f64, Option<f64>, Option<f64>, String, bool);

fn decode_anomaly(row: AnomalyRow) -> Result<Anomaly, StoreError> {
    let (id, sensor_id, ts_us, kind, severity, value, range_min, range_max, description, acknowledged) = row;
    let anomaly_type =
        AnomalyType::from_str(&kind).ok_or_else(|| StoreError::InvalidRow(format!("anomaly_type '{}'", kind)))?;
    let severity =
        Severity::from_str(&severity).ok_or_else(|| StoreError::InvalidRow(format!("severity '{}'", severity)))?;
    let expected_range = match (range_min, range_max) {
        (Some(min), Some(max)) => Some(ExpectedRange { min, max }),
        _ => None,
    };

    Ok(Anomaly {
        id: Some(id),
        sensor_id: SensorId(sensor_id),
        timestamp: from_micros(ts_us)?,
        anomaly_type,
        severity,
        value,
        expected_range,
        description,
        acknowledged,
    })
}

#[async_trait]
impl AnomalyStore for SqliteStore {
    async fn create_anomaly(&self, anomaly: &Anomaly) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO anomalies (
                sensor_id, ts_us, anomaly_type, severity, value,
                expected_range_min, expected_range_max, description, acknowledged
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                anomaly.sensor_id.0,
                anomaly.timestamp.timestamp_micros(),
                anomaly.anomaly_type.as_str(),
                anomaly.severity.as_str(),
                anomaly.value,
                anomaly.expected_range.map(|r| r.min),
                anomaly.expected_range.map(|r| r.max),
                anomaly.description,
                anomaly.acknowledged,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn exists_recent_dropout(&self, sensor_id: SensorId, since: DateTime<Utc>) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT 1 FROM anomalies
             WHERE sensor_id = ?1 AND anomaly_type = 'dropout' AND ts_us >= ?2
             LIMIT 1",
        )?;
        Ok(stmt.exists(params![sensor_id.0, since.timestamp_micros()])?)
    }

    async fn acknowledge_anomaly(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let updated = conn.execute("UPDATE anomalies SET acknowledged = 1 WHERE id = ?1", params![id])?;
        Ok(updated > 0)
    }

    async fn list_anomalies(&self, filter: &AnomalyFilter) -> Result<Vec<Anomaly>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, sensor_id, ts_us, anomaly_type, severity, value,
                    expected_range_min, expected_range_max, description, acknowledged
             FROM anomalies
             WHERE (?1 IS NULL OR sensor_id = ?1)
               AND (?2 IS NULL OR anomaly_type = ?2)
               AND (?3 IS NULL OR severity = ?3)
               AND (?4 = 0 OR acknowledged = 0)
             ORDER BY ts_us DESC, id DESC
             LIMIT ?5",
        )?;
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let rows = stmt.query_map(
            params![
                filter.sensor_id.map(|s| s.0),
                filter.anomaly_type.map(|t| t.as_str()),
                filter.severity.map(|s| s.as_str()),
                filter.unacknowledged_only,
                limit,
            ],
            |row| -> rusqlite::Result<AnomalyRow> {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                ))
            },
        )?;

        let mut anomalies = Vec::new();
        for row in rows {
            anomalies.push(decode_anomaly(row?)?);
        }
        Ok(anomalies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use tempfile::tempdir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn window(sensor: u32, tier: Tier, start: DateTime<Utc>, avg: f64) -> AggregatedWindow {
        AggregatedWindow {
            sensor_id: SensorId(sensor),
            tier,
            window_start: start,
            avg,
            min: avg - 1.0,
            max: avg + 1.0,
            std: Some(0.5),
            count: 60,
        }
    }

    #[tokio::test]
    async fn test_schema_is_idempotent_on_file_db() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        let store = SqliteStore::open(&db_path, Duration::from_millis(500)).unwrap();
        store.insert_samples(&[Sample::new(1, t0(), 1.0)]).unwrap();
        drop(store);

        // reopening re-runs the schema without touching data
        let store = SqliteStore::open(&db_path, Duration::from_millis(500)).unwrap();
        let latest = store.latest_sample(SensorId(1)).await.unwrap();
        assert_eq!(latest.map(|s| s.value), Some(1.0));
    }

    #[tokio::test]
    async fn test_fetch_samples_is_half_open_and_per_sensor() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_samples(&[
                Sample::new(1, t0() - ChronoDuration::microseconds(1), 9.0),
                Sample::new(1, t0(), 1.0),
                Sample::new(1, t0() + ChronoDuration::milliseconds(999), 2.0),
                Sample::new(1, t0() + ChronoDuration::seconds(1), 9.0),
                Sample::new(2, t0() + ChronoDuration::milliseconds(500), 9.0),
            ])
            .unwrap();

        let samples = store
            .fetch_samples(SensorId(1), TimeWindow::new(t0(), t0() + ChronoDuration::seconds(1)))
            .await
            .unwrap();
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 2.0]);
        assert_eq!(samples[1].timestamp, t0() + ChronoDuration::milliseconds(999));
    }

    #[tokio::test]
    async fn test_latest_sample_none_for_silent_sensor() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.latest_sample(SensorId(7)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_same_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_window(&window(1, Tier::Second, t0(), 10.0)).await.unwrap();
        store.upsert_window(&window(1, Tier::Second, t0(), 20.0)).await.unwrap();
        // same start, different tier is a different key
        store.upsert_window(&window(1, Tier::Minute, t0(), 30.0)).await.unwrap();

        let range = TimeWindow::new(t0(), t0() + ChronoDuration::seconds(1));
        let seconds = store.fetch_windows(SensorId(1), Tier::Second, range).await.unwrap();
        assert_eq!(seconds.len(), 1);
        assert_eq!(seconds[0].avg, 20.0);
        assert_eq!(seconds[0].count, 60);
        assert_eq!(seconds[0].std, Some(0.5));

        let minutes = store.fetch_windows(SensorId(1), Tier::Minute, range).await.unwrap();
        assert_eq!(minutes.len(), 1);
        assert_eq!(minutes[0].avg, 30.0);
    }

    fn raw_rows(store: &SqliteStore, table: &str) -> Vec<Vec<rusqlite::types::Value>> {
        let conn = store.conn().unwrap();
        let mut stmt = conn.prepare(&format!("SELECT * FROM {}", table)).unwrap();
        let columns = stmt.column_count();
        let rows = stmt
            .query_map([], |row| (0..columns).map(|i| row.get(i)).collect::<Result<Vec<_>, _>>())
            .unwrap();
        rows.map(|r| r.unwrap()).collect()
    }

    #[tokio::test]
    async fn test_rewrite_leaves_stored_rows_identical() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_window(&window(1, Tier::Second, t0(), 10.0)).await.unwrap();
        let anomaly = Anomaly::new(
            SensorId(1),
            t0(),
            AnomalyType::OutOfRange,
            Severity::High,
            150.0,
            "out of range".to_string(),
        );
        let id = store.create_anomaly(&anomaly).await.unwrap();
        let windows_before = raw_rows(&store, "aggregated_windows");

        std::thread::sleep(Duration::from_millis(5));
        store.upsert_window(&window(1, Tier::Second, t0(), 10.0)).await.unwrap();

        // every stored column comes from the caller, none from wall time
        assert_eq!(raw_rows(&store, "aggregated_windows"), windows_before);
        use rusqlite::types::Value;
        assert_eq!(
            raw_rows(&store, "anomalies"),
            vec![vec![
                Value::Integer(id),
                Value::Integer(1),
                Value::Integer(t0().timestamp_micros()),
                Value::Text("out_of_range".into()),
                Value::Text("high".into()),
                Value::Real(150.0),
                Value::Null,
                Value::Null,
                Value::Text("out of range".into()),
                Value::Integer(0),
            ]]
        );
    }

    #[tokio::test]
    async fn test_null_std_round_trips_as_none() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut w = window(3, Tier::Minute, t0(), 5.0);
        w.std = None;
        store.upsert_window(&w).await.unwrap();

        let range = TimeWindow::new(t0(), t0() + ChronoDuration::minutes(1));
        let fetched = store.fetch_windows(SensorId(3), Tier::Minute, range).await.unwrap();
        assert_eq!(fetched[0].std, None);
    }

    #[tokio::test]
    async fn test_delete_older_than_is_strict_and_tier_scoped() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_window(&window(1, Tier::Second, t0() - ChronoDuration::seconds(1), 1.0)).await.unwrap();
        store.upsert_window(&window(1, Tier::Second, t0(), 1.0)).await.unwrap();
        store.upsert_window(&window(1, Tier::Minute, t0() - ChronoDuration::minutes(5), 1.0)).await.unwrap();

        assert_eq!(store.count_older_than(Tier::Second, t0()).await.unwrap(), 1);
        assert_eq!(store.delete_older_than(Tier::Second, t0()).await.unwrap(), 1);
        assert_eq!(store.count_older_than(Tier::Second, t0()).await.unwrap(), 0);
        // the boundary row survives, as does the other tier
        assert_eq!(store.count_older_than(Tier::Second, t0() + ChronoDuration::seconds(1)).await.unwrap(), 1);
        assert_eq!(store.count_older_than(Tier::Minute, t0()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_anomaly_lifecycle() {
        let store = SqliteStore::open_in_memory().unwrap();
        let spike = Anomaly::new(SensorId(2), t0(), AnomalyType::Spike, Severity::Medium, 57.0, "spike".into())
            .with_expected_range(44.0, 56.0);
        let dropout = Anomaly::new(
            SensorId(2),
            t0() + ChronoDuration::seconds(10),
            AnomalyType::Dropout,
            Severity::High,
            0.0,
            "silent".into(),
        );

        let spike_id = store.create_anomaly(&spike).await.unwrap();
        store.create_anomaly(&dropout).await.unwrap();

        assert!(store.exists_recent_dropout(SensorId(2), t0()).await.unwrap());
        assert!(!store
            .exists_recent_dropout(SensorId(2), t0() + ChronoDuration::seconds(11))
            .await
            .unwrap());
        assert!(!store.exists_recent_dropout(SensorId(3), t0()).await.unwrap());

        let all = store.list_anomalies(&AnomalyFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].anomaly_type, AnomalyType::Dropout);
        assert_eq!(all[1].expected_range, Some(ExpectedRange { min: 44.0, max: 56.0 }));

        assert!(store.acknowledge_anomaly(spike_id).await.unwrap());
        assert!(!store.acknowledge_anomaly(9_999).await.unwrap());

        let open = store
            .list_anomalies(&AnomalyFilter {
                unacknowledged_only: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].anomaly_type, AnomalyType::Dropout);

        let spikes = store
            .list_anomalies(&AnomalyFilter {
                anomaly_type: Some(AnomalyType::Spike),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(spikes.len(), 1);
        assert!(spikes[0].acknowledged);
    }
}
