//! Integration tests for anomaly detection, dropout suppression, derived
//! status and retention
//!
//! Reference distributions are seeded directly into the Second tier so each
//! scenario controls the mean and std the detector sees.

#[cfg(test)]
mod anomaly_detection_tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use sensor_rollup::pipeline::{
        broadcast::LogBroadcastSink,
        clock::ManualClock,
        config::PipelineConfig,
        db::{AnomalyFilter, AnomalyStore, SampleSource, SqliteStore, TierStore},
        detector::SpikeVerdict,
        engine::PipelineEngine,
        retention::RetentionTarget,
        status::SensorStatus,
        types::{AggregatedWindow, Anomaly, AnomalyType, Sample, SensorId, SensorRegistry, Severity, Tier},
    };
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 7, 9, 30, 0).unwrap()
    }

    fn setup(sensors: &[u32]) -> (PipelineEngine, Arc<SqliteStore>, Arc<ManualClock>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(t0()));
        let config = PipelineConfig {
            sensors: SensorRegistry::new(sensors.iter().copied()),
            ..PipelineConfig::default()
        };
        let engine = PipelineEngine::with_sqlite(config, store.clone(), Arc::new(LogBroadcastSink)).with_clock(clock.clone());
        (engine, store, clock)
    }

    /// 30 Second windows before `t0` alternating 48/52: mean 50, std 2
    async fn seed_history(store: &SqliteStore, sensor: u32) {
        for i in 1..=30 {
            let avg = if i % 2 == 0 { 48.0 } else { 52.0 };
            store
                .upsert_window(&AggregatedWindow {
                    sensor_id: SensorId(sensor),
                    tier: Tier::Second,
                    window_start: t0() - Duration::seconds(i),
                    avg,
                    min: avg,
                    max: avg,
                    std: Some(0.0),
                    count: 1,
                })
                .await
                .unwrap();
        }
    }

    /// Put `value` in the window `[t0, t0+1s)` and roll it up
    async fn roll_value(engine: &PipelineEngine, store: &SqliteStore, clock: &ManualClock, sensor: u32, value: f64) {
        store
            .insert_samples(&[Sample::new(sensor, t0() + Duration::milliseconds(200), value)])
            .unwrap();
        clock.set(t0() + Duration::milliseconds(1_050));
        let report = engine.run_second_rollup().await;
        assert!(report.is_clean());
    }

    async fn anomalies_of(store: &SqliteStore, sensor: u32) -> Vec<Anomaly> {
        store
            .list_anomalies(&AnomalyFilter {
                sensor_id: Some(SensorId(sensor)),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_spike_beyond_five_sigma_is_high() {
        let (engine, store, clock) = setup(&[1]);
        seed_history(&store, 1).await;
        roll_value(&engine, &store, &clock, 1, 65.0).await;

        let found = anomalies_of(&store, 1).await;
        assert_eq!(found.len(), 1);
        let spike = &found[0];
        assert_eq!(spike.anomaly_type, AnomalyType::Spike);
        assert_eq!(spike.severity, Severity::High);
        assert_eq!(spike.timestamp, t0());
        let range = spike.expected_range.unwrap();
        assert!((range.min - 44.0).abs() < 1e-9);
        assert!((range.max - 56.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_spike_between_three_and_five_sigma_is_medium() {
        let (engine, store, clock) = setup(&[1]);
        seed_history(&store, 1).await;
        roll_value(&engine, &store, &clock, 1, 57.0).await;

        let found = anomalies_of(&store, 1).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].anomaly_type, AnomalyType::Spike);
        assert_eq!(found[0].severity, Severity::Medium);
    }

    #[tokio::test]
    async fn test_normal_value_raises_nothing() {
        let (engine, store, clock) = setup(&[1]);
        seed_history(&store, 1).await;
        roll_value(&engine, &store, &clock, 1, 51.0).await;
        assert!(anomalies_of(&store, 1).await.is_empty());

        let evaluation = engine.evaluate_spike(SensorId(1), t0(), 51.0).await.unwrap();
        assert!(matches!(evaluation.verdict, SpikeVerdict::Normal { .. }));
    }

    #[tokio::test]
    async fn test_out_of_range_without_history() {
        let (engine, store, clock) = setup(&[1]);
        roll_value(&engine, &store, &clock, 1, 150.0).await;

        let found = anomalies_of(&store, 1).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].anomaly_type, AnomalyType::OutOfRange);
        assert_eq!(found[0].severity, Severity::High);

        let evaluation = engine.evaluate_spike(SensorId(1), t0(), 150.0).await.unwrap();
        assert!(evaluation.is_insufficient());
    }

    #[tokio::test]
    async fn test_spike_and_out_of_range_fire_together() {
        let (engine, store, clock) = setup(&[1]);
        seed_history(&store, 1).await;
        roll_value(&engine, &store, &clock, 1, 150.0).await;

        let mut kinds: Vec<AnomalyType> = anomalies_of(&store, 1).await.iter().map(|a| a.anomaly_type).collect();
        kinds.sort_by_key(|k| k.as_str());
        assert_eq!(kinds, vec![AnomalyType::OutOfRange, AnomalyType::Spike]);
    }

    #[tokio::test]
    async fn test_flat_history_never_spikes() {
        let (engine, store, clock) = setup(&[1]);
        for i in 1..=30 {
            store
                .upsert_window(&AggregatedWindow {
                    sensor_id: SensorId(1),
                    tier: Tier::Second,
                    window_start: t0() - Duration::seconds(i),
                    avg: 50.0,
                    min: 50.0,
                    max: 50.0,
                    std: Some(0.0),
                    count: 1,
                })
                .await
                .unwrap();
        }
        roll_value(&engine, &store, &clock, 1, 90.0).await;
        assert!(anomalies_of(&store, 1).await.is_empty());
    }

    #[tokio::test]
    async fn test_dropout_is_suppressed_within_window() {
        let (engine, store, clock) = setup(&[1, 2]);
        store
            .insert_samples(&[Sample::new(1, t0(), 50.0), Sample::new(2, t0(), 50.0)])
            .unwrap();

        // 1. Sensor 2 keeps reporting, sensor 1 goes quiet
        clock.set(t0() + Duration::seconds(10));
        store
            .insert_samples(&[Sample::new(2, t0() + Duration::seconds(9), 50.0)])
            .unwrap();
        let first = engine.run_dropout_sweep().await;
        assert_eq!(first.raised, 1);
        assert_eq!(first.live, 1);

        // 2. One minute later the outage continues: no duplicate
        clock.set(t0() + Duration::seconds(70));
        store
            .insert_samples(&[Sample::new(2, t0() + Duration::seconds(69), 50.0)])
            .unwrap();
        let second = engine.run_dropout_sweep().await;
        assert_eq!(second.raised, 0);
        assert_eq!(second.suppressed, 1);

        let dropouts = anomalies_of(&store, 1).await;
        assert_eq!(dropouts.len(), 1);
        assert_eq!(dropouts[0].anomaly_type, AnomalyType::Dropout);
        assert_eq!(dropouts[0].severity, Severity::High);
        assert_eq!(dropouts[0].description, "No data received for 10 seconds");

        // 3. Past the suppression window a new one is raised
        clock.set(t0() + Duration::seconds(10) + Duration::minutes(5) + Duration::seconds(1));
        let third = engine.run_dropout_sweep().await;
        assert_eq!(third.raised, 2, "sensor 2 is silent by now as well");
        assert_eq!(anomalies_of(&store, 1).await.len(), 2);
    }

    #[tokio::test]
    async fn test_sensor_status_is_derived_on_read() {
        let (engine, store, clock) = setup(&[1, 2, 3, 4]);
        store
            .insert_samples(&[
                Sample::new(1, t0() - Duration::seconds(2), 50.0),
                Sample::new(2, t0() - Duration::seconds(30), 51.0),
                Sample::new(3, t0() - Duration::seconds(90), 52.0),
            ])
            .unwrap();
        clock.set(t0());

        let statuses = engine.sensor_statuses().await.unwrap();
        let by_sensor: Vec<(u32, SensorStatus)> = statuses.iter().map(|s| (s.sensor_id.0, s.status)).collect();
        assert_eq!(
            by_sensor,
            vec![
                (1, SensorStatus::Online),
                (2, SensorStatus::Degraded),
                (3, SensorStatus::Offline),
                (4, SensorStatus::NoData),
            ]
        );
        assert_eq!(statuses[1].last_value, Some(51.0));
    }

    #[tokio::test]
    async fn test_retention_boundary_is_strict() {
        let (engine, store, clock) = setup(&[1]);
        let now = t0();
        clock.set(now);
        let horizon = now - Duration::days(7);
        store
            .insert_samples(&[
                Sample::new(1, horizon - Duration::microseconds(1), 1.0),
                Sample::new(1, horizon, 2.0),
                Sample::new(1, now - Duration::days(1), 3.0),
            ])
            .unwrap();
        store
            .upsert_window(&AggregatedWindow {
                sensor_id: SensorId(1),
                tier: Tier::Second,
                window_start: now - Duration::days(10),
                avg: 1.0,
                min: 1.0,
                max: 1.0,
                std: Some(0.0),
                count: 1,
            })
            .await
            .unwrap();

        let preview = engine.preview_retention().await;
        assert_eq!(preview.purged(RetentionTarget::Raw), Some(1));

        let report = engine.run_retention_sweep().await;
        assert!(report.is_clean());
        assert_eq!(report.purged(RetentionTarget::Raw), Some(1));
        assert_eq!(report.purged(RetentionTarget::Tier(Tier::Second)), Some(0));

        // nothing older than the horizon remains, the boundary sample does
        assert_eq!(store.count_samples_older_than(horizon).await.unwrap(), 0);
        assert_eq!(store.count_samples_older_than(now).await.unwrap(), 2);
        // 10-day-old Second window is inside its 30-day horizon
        assert_eq!(store.count_older_than(Tier::Second, now).await.unwrap(), 1);
    }

    fn window_at(tier: Tier, start: DateTime<Utc>) -> AggregatedWindow {
        AggregatedWindow {
            sensor_id: SensorId(1),
            tier,
            window_start: start,
            avg: 1.0,
            min: 1.0,
            max: 1.0,
            std: Some(0.0),
            count: 1,
        }
    }

    #[tokio::test]
    async fn test_retention_purges_each_tier_past_its_horizon() {
        let (engine, store, clock) = setup(&[1]);
        let now = t0();
        clock.set(now);

        // 1. One row just past and one just inside each bounded tier horizon
        for (tier, days) in [(Tier::Second, 30), (Tier::Minute, 365)] {
            let horizon = now - Duration::days(days);
            store.upsert_window(&window_at(tier, horizon - tier.granularity())).await.unwrap();
            store.upsert_window(&window_at(tier, horizon)).await.unwrap();
        }
        store
            .upsert_window(&window_at(Tier::Hour, now - Duration::days(3_650)))
            .await
            .unwrap();

        // 2. Sweep
        let report = engine.run_retention_sweep().await;
        assert!(report.is_clean());
        assert_eq!(report.purged(RetentionTarget::Tier(Tier::Second)), Some(1));
        assert_eq!(report.purged(RetentionTarget::Tier(Tier::Minute)), Some(1));
        assert_eq!(report.purged(RetentionTarget::Tier(Tier::Hour)), None);

        // 3. Only the boundary rows and the hour row remain
        assert_eq!(store.count_older_than(Tier::Second, now - Duration::days(30)).await.unwrap(), 0);
        assert_eq!(store.count_older_than(Tier::Second, now).await.unwrap(), 1);
        assert_eq!(store.count_older_than(Tier::Minute, now - Duration::days(365)).await.unwrap(), 0);
        assert_eq!(store.count_older_than(Tier::Minute, now).await.unwrap(), 1);
        assert_eq!(store.count_older_than(Tier::Hour, now).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_extreme_horizons_do_not_stop_the_engine() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(t0()));
        let mut config = PipelineConfig {
            sensors: SensorRegistry::new([1u32]),
            ..PipelineConfig::default()
        };
        config.retention.minute = Some(Duration::days(200_000_000));
        config.anomaly.lookback = Duration::days(200_000_000);
        config.dropout.suppression = Duration::days(200_000_000);
        assert!(config.validate().is_err());

        // built directly, bypassing validation
        let engine = PipelineEngine::with_sqlite(config, store.clone(), Arc::new(LogBroadcastSink))
            .with_clock(clock.clone());
        store
            .upsert_window(&window_at(Tier::Minute, t0() - Duration::days(3_650)))
            .await
            .unwrap();

        let report = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run_retention_sweep().await }
        })
        .await
        .expect("retention sweep task panicked");
        assert!(report.is_clean());
        assert_eq!(report.purged(RetentionTarget::Tier(Tier::Minute)), None);
        assert_eq!(store.count_older_than(Tier::Minute, t0()).await.unwrap(), 1);

        roll_value(&engine, &store, &clock, 1, 150.0).await;
        assert_eq!(anomalies_of(&store, 1).await.len(), 1);

        clock.set(t0() + Duration::seconds(30));
        let dropouts = engine.run_dropout_sweep().await;
        assert!(dropouts.failures.is_empty());
        assert_eq!(dropouts.raised, 1);
    }

    #[tokio::test]
    async fn test_acknowledgment_is_the_only_mutation() {
        let (engine, store, clock) = setup(&[1]);
        roll_value(&engine, &store, &clock, 1, -5.0).await;

        let open = engine
            .list_anomalies(&AnomalyFilter {
                unacknowledged_only: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(open.len(), 1);

        let id = open[0].id.unwrap();
        assert!(engine.acknowledge_anomaly(id).await.unwrap());

        let all = anomalies_of(&store, 1).await;
        assert!(all[0].acknowledged);
        assert_eq!(all[0].value, -5.0);
        assert_eq!(all[0].description, open[0].description);
    }
}
