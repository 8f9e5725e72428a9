//! Sensor Simulator - synthetic sample stream for local runs
//!
//! Writes 60 samples per second for every registered sensor straight into
//! the sample store, so `pipeline_runtime` has something to roll up.
//! Each batch is written half way through the second it is stamped with,
//! so a Second window is complete before the rollup reads it.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin sensor_simulator -- --duration 600 --silent-sensor 3
//! ```
//!
//! ## Arguments
//!
//! - `--duration SECS` - stop after this many seconds (default: run until CTRL+C)
//! - `--silent-sensor ID` - never emit for this sensor (repeatable), to exercise dropouts
//! - `--spike-probability P` - chance per sensor-second of a ±20 excursion (default: 0.01)
//!
//! Sensors and database path come from the same environment as the runtime
//! (`SENSOR_IDS` / `SENSOR_COUNT`, `PIPELINE_DB_PATH`).

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dotenv::dotenv;
use log::{error, info};
use rand::Rng;
use sensor_rollup::pipeline::{
    config::PipelineConfig,
    db::SqliteStore,
    types::{Sample, SensorId},
    windows::floor_to,
};
use std::collections::HashSet;
use std::env;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

const SAMPLES_PER_SECOND: i64 = 60;
const SPIKE_MAGNITUDE: f64 = 20.0;

#[derive(Debug)]
struct SimulatorArgs {
    duration_secs: Option<u64>,
    silent: HashSet<SensorId>,
    spike_probability: f64,
}

fn parse_args() -> Result<SimulatorArgs, String> {
    let args: Vec<String> = env::args().collect();
    let mut parsed = SimulatorArgs {
        duration_secs: None,
        silent: HashSet::new(),
        spike_probability: 0.01,
    };

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--duration", Some(v)) => {
                parsed.duration_secs = Some(v.parse().map_err(|_| format!("invalid --duration '{}'", v))?);
            }
            ("--silent-sensor", Some(v)) => {
                let id: u32 = v.parse().map_err(|_| format!("invalid --silent-sensor '{}'", v))?;
                parsed.silent.insert(SensorId(id));
            }
            ("--spike-probability", Some(v)) => {
                let p: f64 = v.parse().map_err(|_| format!("invalid --spike-probability '{}'", v))?;
                if !(0.0..=1.0).contains(&p) {
                    return Err(format!("--spike-probability must be in [0, 1], got {}", p));
                }
                parsed.spike_probability = p;
            }
            (flag, _) => return Err(format!("unrecognized argument '{}'", flag)),
        }
        i += 2;
    }
    Ok(parsed)
}

/// Delay from `now` to the next half second
fn until_half_second(now: DateTime<Utc>) -> Duration {
    let into_second = now.timestamp_subsec_millis() as u64 % 1_000;
    Duration::from_millis((1_500 - into_second) % 1_000)
}

/// Timestamps for one batch, all inside the second containing `now`
fn batch_timestamps(now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let second_start = floor_to(now, ChronoDuration::seconds(1));
    let step = ChronoDuration::microseconds(1_000_000 / SAMPLES_PER_SECOND);
    (0..SAMPLES_PER_SECOND).map(|i| second_start + step * i as i32).collect()
}

/// Per-sensor baseline so the sensors are distinguishable on a chart
fn baseline(sensor_id: SensorId) -> f64 {
    40.0 + (sensor_id.0 % 5) as f64 * 5.0
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            error!("❌ {}", e);
            return Err(e.into());
        }
    };
    let config = PipelineConfig::from_env()?;
    let store = SqliteStore::open(&config.db_path, Duration::from_millis(config.busy_timeout_ms))?;

    info!("🚀 Sensor Simulator");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Sensors: {} ({} silent)", config.sensors.len(), args.silent.len());
    info!("   ├─ Rate: {} Hz per sensor", SAMPLES_PER_SECOND);
    info!("   ├─ Spike probability: {}", args.spike_probability);
    match args.duration_secs {
        Some(secs) => info!("   └─ Duration: {}s", secs),
        None => info!("   └─ Duration: until CTRL+C"),
    }

    let mut timer = interval_at(Instant::now() + until_half_second(Utc::now()), Duration::from_secs(1));
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut rng = rand::thread_rng();
    let mut elapsed_secs = 0u64;
    let mut total = 0usize;

    loop {
        tokio::select! {
            _ = timer.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("⚠️  Received CTRL+C, stopping");
                break;
            }
        }

        // the in-progress second, never one the rollup may have closed
        let timestamps = batch_timestamps(Utc::now());
        let mut batch = Vec::with_capacity(config.sensors.len() * SAMPLES_PER_SECOND as usize);

        for sensor_id in config.sensors.iter() {
            if args.silent.contains(&sensor_id) {
                continue;
            }
            let offset = if rng.gen_bool(args.spike_probability) {
                let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                info!("💥 Injecting spike on sensor {}", sensor_id);
                sign * SPIKE_MAGNITUDE
            } else {
                0.0
            };
            for ts in &timestamps {
                let value = baseline(sensor_id) + offset + rng.gen_range(-2.0..2.0);
                batch.push(Sample::new(sensor_id, *ts, value));
            }
        }

        match store.insert_samples(&batch) {
            Ok(n) => total += n,
            Err(e) => error!("❌ Failed to insert samples: {}", e),
        }

        elapsed_secs += 1;
        if elapsed_secs % 60 == 0 {
            info!("📊 {} samples written in {}s", total, elapsed_secs);
        }
        if args.duration_secs.is_some_and(|limit| elapsed_secs >= limit) {
            break;
        }
    }

    info!("✅ Simulator stopped ({} samples written)", total);
    Ok(())
}
