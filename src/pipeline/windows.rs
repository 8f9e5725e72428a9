//! Window alignment for tier rollups
//!
//! A rollup always targets the most recently *completed* window:
//!
//! ```text
//! window_start = floor(now, granularity) - granularity
//! window_end   = window_start + granularity
//! ```
//!
//! The in-progress window is never aggregated, so its inputs cannot change
//! underneath a rollup.

use super::types::Tier;
use chrono::{DateTime, Duration, Utc};

/// Half-open interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Round `now` down to a multiple of `granularity` (relative to the epoch)
pub fn floor_to(now: DateTime<Utc>, granularity: Duration) -> DateTime<Utc> {
    let step = granularity.num_microseconds().unwrap_or(i64::MAX).max(1);
    let micros = now.timestamp_micros();
    let floored = micros - micros.rem_euclid(step);
    // floored <= micros, so this is always in range
    DateTime::from_timestamp_micros(floored).unwrap_or(now)
}

/// The most recently completed window of `tier` as of `now`
pub fn completed_window(tier: Tier, now: DateTime<Utc>) -> TimeWindow {
    let granularity = tier.granularity();
    let start = floor_to(now, granularity) - granularity;
    TimeWindow::new(start, start + granularity)
}

/// Trailing lookback `[end - lookback, end)`
pub fn lookback_window(end: DateTime<Utc>, lookback: Duration) -> TimeWindow {
    let start = end.checked_sub_signed(lookback).unwrap_or(DateTime::<Utc>::MIN_UTC);
    TimeWindow::new(start, end)
}
