//! # Tiered Sensor Rollup Pipeline
//!
//! Turns a raw stream of sensor samples into Second, Minute and Hour
//! summary windows, detects spikes, out-of-range readings and dropouts,
//! and enforces per-store retention.
//!
//! ## Architecture
//!
//! ```text
//! raw samples ──► Second ──► Minute ──► Hour
//!                   │
//!                   └──► SpikeDetector ──► anomalies
//! latest sample ──► DropoutDetector ──► anomalies
//! ```
//!
//! Each tier is built only from the tier below (raw samples for Second).
//! Minute and Hour statistics are therefore an aggregate of aggregates:
//! `avg` is the mean of child averages and `std` the mean of child
//! standard deviations. `CascadeMode::Pooled` is available when the exact
//! pooled variance is needed.
//!
//! The engine exposes stateless entry points (`PipelineEngine::run_*`);
//! `scheduler` is one way to trigger them periodically.
//!
//! ## Schema Reference
//!
//! SQL schema lives in `/sql/`:
//! - `sensor_samples` → `Sample`
//! - `aggregated_windows` → `AggregatedWindow` (all tiers, keyed by tier)
//! - `anomalies` → `Anomaly`
//!
//! ## Module Organization
//!
//! - `types` - Core data structures (Sample, AggregatedWindow, Anomaly)
//! - `windows` - Window alignment
//! - `stats` - Summary statistics and cascade modes
//! - `rollup` - Per-sensor tier aggregation
//! - `detector` - Spike, out-of-range and dropout rules
//! - `status` - Derived sensor status
//! - `retention` - Retention sweeps
//! - `db` - Store traits and the SQLite adapter
//! - `broadcast` - Live event sinks
//! - `engine` - Entry points
//! - `scheduler` - Interval tasks driving the entry points

pub mod broadcast;
pub mod clock;
pub mod config;
pub mod db;
pub mod detector;
pub mod engine;
pub mod error;
pub mod retention;
pub mod rollup;
pub mod scheduler;
pub mod stats;
pub mod status;
pub mod types;
pub mod windows;

// Re-export commonly used types
pub use broadcast::{BroadcastSink, ChannelBroadcastSink, LiveEvent};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PipelineConfig;
pub use db::{AnomalyFilter, AnomalyStore, SampleSource, SqliteStore, TierStore};
pub use engine::{DropoutReport, PipelineEngine};
pub use error::{PipelineError, StoreError};
pub use retention::RetentionReport;
pub use rollup::RollupReport;
pub use stats::CascadeMode;
pub use status::{SensorStatus, SensorStatusReport};
pub use types::{AggregatedWindow, Anomaly, AnomalyType, Sample, SensorId, SensorRegistry, Severity, Tier};
