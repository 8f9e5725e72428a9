//! Window statistics
//!
//! Second-tier windows are computed from raw samples. Minute and hour
//! windows are computed from the tier below ("aggregate of aggregates"):
//!
//! - `avg` is the unweighted mean of child `avg` values
//! - `min` / `max` are the extrema of child `min` / `max`
//! - `count` is the sum of child counts
//! - `std` is the mean of the child `std` values that are present, or 0
//!
//! This is an approximation of the statistics of the underlying raw
//! population and is the default contract. `CascadeMode::Pooled` computes
//! the exact count-weighted mean and pooled population std instead.

use super::types::{AggregatedWindow, Sample};

/// How a tier summarizes the windows of the tier below
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CascadeMode {
    #[default]
    Approximate,
    Pooled,
}

impl CascadeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CascadeMode::Approximate => "approximate",
            CascadeMode::Pooled => "pooled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "approximate" => Some(CascadeMode::Approximate),
            "pooled" => Some(CascadeMode::Pooled),
            _ => None,
        }
    }
}

/// Statistics for one window, before it is keyed to a sensor and tier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSummary {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub std: f64,
    pub count: u64,
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (divides by `n`)
pub fn population_std(values: &[f64]) -> Option<f64> {
    let mu = mean(values)?;
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Summarize raw samples. `None` when there are no samples.
pub fn summarize_samples(samples: &[Sample]) -> Option<WindowSummary> {
    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    let avg = mean(&values)?;
    let std = population_std(&values)?;

    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    Some(WindowSummary {
        avg,
        min,
        max,
        std,
        count: values.len() as u64,
    })
}

/// Summarize child windows from the tier below. `None` when there are none.
pub fn summarize_children(children: &[AggregatedWindow], mode: CascadeMode) -> Option<WindowSummary> {
    if children.is_empty() {
        return None;
    }

    let min = children.iter().map(|w| w.min).fold(f64::INFINITY, f64::min);
    let max = children.iter().map(|w| w.max).fold(f64::NEG_INFINITY, f64::max);
    let count: u64 = children.iter().map(|w| w.count).sum();

    let (avg, std) = match mode {
        CascadeMode::Approximate => {
            let avgs: Vec<f64> = children.iter().map(|w| w.avg).collect();
            let stds: Vec<f64> = children.iter().filter_map(|w| w.std).collect();
            (mean(&avgs)?, mean(&stds).unwrap_or(0.0))
        }
        CascadeMode::Pooled => pooled(children, count)?,
    };

    Some(WindowSummary {
        avg,
        min,
        max,
        std,
        count,
    })
}

/// Count-weighted mean and pooled population std:
/// `var = Σ nᵢ(σᵢ² + (μᵢ − μ)²) / Σ nᵢ`
fn pooled(children: &[AggregatedWindow], total: u64) -> Option<(f64, f64)> {
    if total == 0 {
        return None;
    }
    let n = total as f64;
    let mu = children.iter().map(|w| w.count as f64 * w.avg).sum::<f64>() / n;
    let variance = children
        .iter()
        .map(|w| {
            let sigma = w.std.unwrap_or(0.0);
            w.count as f64 * (sigma * sigma + (w.avg - mu).powi(2))
        })
        .sum::<f64>()
        / n;
    Some((mu, variance.max(0.0).sqrt()))
}
