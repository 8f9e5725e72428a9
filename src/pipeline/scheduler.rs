//! Periodic triggers for the engine entry points
//!
//! One tokio task per entry point, each on its own interval. Missed ticks
//! are skipped rather than bursted, so a slow pass never queues a backlog.
//! Entry points overlap freely: the Minute rollup does not wait for the
//! Second rollup, and so on.

use super::config::ScheduleConfig;
use super::engine::PipelineEngine;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Spawn every scheduler task. Abort the handles to stop them.
pub fn spawn_schedulers(engine: PipelineEngine, schedule: &ScheduleConfig) -> Vec<JoinHandle<()>> {
    log::info!("⏰ Starting schedulers");
    log::info!("   ├─ Second rollup: every {}ms", schedule.second_rollup_interval_ms);
    log::info!("   ├─ Minute rollup: every {}ms", schedule.minute_rollup_interval_ms);
    log::info!("   ├─ Hour rollup: every {}ms", schedule.hour_rollup_interval_ms);
    log::info!("   ├─ Dropout sweep: every {}ms", schedule.dropout_interval_ms);
    log::info!("   └─ Retention sweep: every {}ms", schedule.retention_interval_ms);

    vec![
        spawn_every(engine.clone(), schedule.second_rollup_interval_ms, |e| async move {
            e.run_second_rollup().await;
        }),
        spawn_every(engine.clone(), schedule.minute_rollup_interval_ms, |e| async move {
            e.run_minute_rollup().await;
        }),
        spawn_every(engine.clone(), schedule.hour_rollup_interval_ms, |e| async move {
            e.run_hour_rollup().await;
        }),
        spawn_every(engine.clone(), schedule.dropout_interval_ms, |e| async move {
            e.run_dropout_sweep().await;
        }),
        spawn_every(engine, schedule.retention_interval_ms, |e| async move {
            e.run_retention_sweep().await;
        }),
    ]
}

/// Run `job` on a fixed interval until the task is aborted
///
/// The first tick fires immediately. Reports are logged by the engine.
fn spawn_every<F, Fut>(engine: PipelineEngine, interval_ms: u64, job: F) -> JoinHandle<()>
where
    F: Fn(PipelineEngine) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut timer = interval(Duration::from_millis(interval_ms.max(1)));
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            timer.tick().await;
            job(engine.clone()).await;
        }
    })
}
