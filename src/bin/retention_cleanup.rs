//! Retention Cleanup - run one retention sweep on demand
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin retention_cleanup -- --dry-run
//! cargo run --release --bin retention_cleanup -- --raw-days 3
//! ```
//!
//! - `--dry-run` - only count rows older than each horizon
//! - `--raw-days N` - override the raw sample horizon for this run
//!
//! Horizons otherwise come from `RETENTION_*_DAYS` (see `PipelineConfig`).

use chrono::Duration as ChronoDuration;
use dotenv::dotenv;
use log::{error, info, warn};
use sensor_rollup::pipeline::{
    broadcast::LogBroadcastSink,
    config::PipelineConfig,
    db::SqliteStore,
    engine::PipelineEngine,
    retention::RetentionOutcome,
};
use std::env;
use std::sync::Arc;
use std::time::Duration;

fn parse_raw_days(args: &[String]) -> Result<Option<i64>, String> {
    let Some(idx) = args.iter().position(|x| x == "--raw-days") else {
        return Ok(None);
    };
    match args.get(idx + 1).map(|s| s.parse::<i64>()) {
        Some(Ok(days)) if days > 0 => Ok(Some(days)),
        _ => Err("--raw-days expects a positive integer".to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let dry_run = args.contains(&"--dry-run".to_string());

    let mut config = PipelineConfig::from_env()?;
    if let Some(days) = parse_raw_days(&args)? {
        config.retention.raw = Some(ChronoDuration::days(days));
    }

    info!("🧹 Retention Cleanup");
    info!("   ├─ Database: {}", config.db_path);
    info!("   └─ Mode: {}", if dry_run { "dry run (count only)" } else { "delete" });

    let store = Arc::new(SqliteStore::open(
        &config.db_path,
        Duration::from_millis(config.busy_timeout_ms),
    )?);
    let engine = PipelineEngine::with_sqlite(config, store, Arc::new(LogBroadcastSink));

    let report = if dry_run {
        engine.preview_retention().await
    } else {
        engine.run_retention_sweep().await
    };

    for entry in &report.entries {
        match (&entry.outcome, entry.cutoff) {
            (RetentionOutcome::Purged(n), Some(cutoff)) => {
                info!(
                    "   ├─ {:<6} {} rows {} (older than {})",
                    entry.target.as_str(),
                    n,
                    if dry_run { "eligible" } else { "deleted" },
                    cutoff.format("%Y-%m-%d %H:%M:%S")
                );
            }
            (RetentionOutcome::Unbounded, _) | (RetentionOutcome::Purged(_), None) => {
                info!("   ├─ {:<6} kept forever", entry.target.as_str());
            }
            (RetentionOutcome::Failed(e), _) => {
                warn!("   ├─ {:<6} FAILED: {}", entry.target.as_str(), e);
            }
        }
    }
    info!("   └─ Total: {} rows", report.total_purged());

    if !report.is_clean() {
        error!("❌ Retention finished with failures");
        return Err("retention sweep failed for at least one store".into());
    }
    info!("✅ Retention complete");
    Ok(())
}
