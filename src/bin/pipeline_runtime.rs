//! Pipeline Runtime - periodic trigger for the rollup engine
//!
//! This binary:
//! - Opens the SQLite store and applies the schema
//! - Builds the broadcast sinks (channel + log, optional JSONL file)
//! - Spawns one scheduler task per engine entry point
//! - Runs until CTRL+C
//!
//! Usage:
//!   cargo run --release --bin pipeline_runtime
//!
//! Environment variables: see `PipelineConfig::from_env`. The most common:
//!   PIPELINE_DB_PATH - SQLite database path (default: sensors.db)
//!   SENSOR_IDS / SENSOR_COUNT - registered sensors (default: 1..=12)
//!   BROADCAST_JSONL_PATH - also append live events to this file
//!   RUST_LOG - log level (default: info)

use dotenv::dotenv;
use log::{error, info, warn};
use sensor_rollup::pipeline::{
    broadcast::{BroadcastSink, ChannelBroadcastSink, FanoutBroadcastSink, JsonlBroadcastSink, LogBroadcastSink},
    config::PipelineConfig,
    db::SqliteStore,
    engine::PipelineEngine,
    scheduler::spawn_schedulers,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("🚀 Sensor Rollup Pipeline Runtime");
    info!("   ├─ Version: {}", env!("CARGO_PKG_VERSION"));
    info!("   └─ Tiers: second → minute → hour");

    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    let sensors: Vec<String> = config.sensors.iter().map(|s| s.to_string()).collect();
    info!("✅ Configuration loaded");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Sensors: [{}]", sensors.join(", "));
    info!("   ├─ Cascade std mode: {}", config.cascade_mode.as_str());
    info!(
        "   ├─ Spike threshold: {}σ (high above {}σ, min {} windows over {}s)",
        config.anomaly.spike_sigma,
        config.anomaly.high_severity_sigma,
        config.anomaly.min_samples,
        config.anomaly.lookback.num_seconds()
    );
    info!("   ├─ Value bounds: [{}, {}]", config.anomaly.value_min, config.anomaly.value_max);
    info!(
        "   └─ Dropout: liveness {}s, suppression {}s",
        config.dropout.liveness.num_seconds(),
        config.dropout.suppression.num_seconds()
    );

    // Initialize database (schema migrations are idempotent)
    info!("🔧 Initializing database...");
    let store = Arc::new(SqliteStore::open(
        &config.db_path,
        Duration::from_millis(config.busy_timeout_ms),
    )?);

    // Live event sinks
    let mut sinks: Vec<Arc<dyn BroadcastSink>> = vec![
        Arc::new(ChannelBroadcastSink::new(config.broadcast_capacity)),
        Arc::new(LogBroadcastSink),
    ];
    if let Some(path) = &config.broadcast_jsonl_path {
        match JsonlBroadcastSink::new(path) {
            Ok(jsonl) => sinks.push(Arc::new(jsonl)),
            Err(e) => warn!("⚠️  JSONL broadcast disabled ({}): {}", path, e),
        }
    }
    let sink: Arc<dyn BroadcastSink> = Arc::new(FanoutBroadcastSink::new(sinks));
    info!("✅ Broadcast ready (channel capacity: {})", config.broadcast_capacity);

    let schedule = config.schedule.clone();
    let engine = PipelineEngine::with_sqlite(config, store, sink);
    info!("✅ PipelineEngine created");

    let handles = spawn_schedulers(engine, &schedule);
    info!("✅ {} scheduler tasks running", handles.len());
    info!("");
    info!("🔄 Press CTRL+C to shutdown gracefully");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("");
            info!("⚠️  Received CTRL+C, shutting down...");
        }
        Err(err) => {
            error!("❌ Failed to listen for CTRL+C: {}", err);
        }
    }

    // In-flight passes write nothing partial, so aborting is safe
    for handle in &handles {
        handle.abort();
    }
    for handle in handles {
        let _ = handle.await;
    }

    info!("✅ Pipeline runtime stopped");
    Ok(())
}
