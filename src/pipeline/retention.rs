//! Retention sweeps
//!
//! Each store is purged independently with a strict `< now - horizon`
//! cutoff. A failing store is reported and the remaining stores are still
//! swept. Anomalies are never purged here.

use super::config::RetentionPolicy;
use super::db::{SampleSource, TierStore};
use super::error::StoreError;
use super::types::Tier;
use chrono::{DateTime, Utc};
use std::fmt;

/// A store subject to retention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionTarget {
    Raw,
    Tier(Tier),
}

impl RetentionTarget {
    pub fn all() -> [RetentionTarget; 4] {
        [
            RetentionTarget::Raw,
            RetentionTarget::Tier(Tier::Second),
            RetentionTarget::Tier(Tier::Minute),
            RetentionTarget::Tier(Tier::Hour),
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionTarget::Raw => "raw",
            RetentionTarget::Tier(tier) => tier.as_str(),
        }
    }
}

impl fmt::Display for RetentionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum RetentionOutcome {
    /// Rows deleted, or rows that would be deleted in a dry run
    Purged(u64),
    /// No horizon configured for this store
    Unbounded,
    Failed(StoreError),
}

#[derive(Debug)]
pub struct RetentionEntry {
    pub target: RetentionTarget,
    pub cutoff: Option<DateTime<Utc>>,
    pub outcome: RetentionOutcome,
}

#[derive(Debug)]
pub struct RetentionReport {
    pub now: DateTime<Utc>,
    pub dry_run: bool,
    pub entries: Vec<RetentionEntry>,
}

impl RetentionReport {
    pub fn total_purged(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| match e.outcome {
                RetentionOutcome::Purged(n) => n,
                _ => 0,
            })
            .sum()
    }

    /// Purged count for one store; `None` if it was unbounded or failed
    pub fn purged(&self, target: RetentionTarget) -> Option<u64> {
        self.entries.iter().find(|e| e.target == target).and_then(|e| match e.outcome {
            RetentionOutcome::Purged(n) => Some(n),
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (RetentionTarget, &StoreError)> + '_ {
        self.entries.iter().filter_map(|e| match &e.outcome {
            RetentionOutcome::Failed(err) => Some((e.target, err)),
            _ => None,
        })
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

#[derive(Debug, Clone)]
pub struct RetentionManager {
    policy: RetentionPolicy,
}

impl RetentionManager {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Cutoff for a store at `now`, or `None` when it is kept forever
    ///
    /// A horizon reaching back past the earliest representable instant
    /// cannot have anything older than it and also yields `None`.
    pub fn cutoff(&self, target: RetentionTarget, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let horizon = match target {
            RetentionTarget::Raw => self.policy.raw,
            RetentionTarget::Tier(tier) => self.policy.for_tier(tier),
        };
        horizon.and_then(|h| now.checked_sub_signed(h))
    }

    /// Purge every store, or only count what would go when `dry_run` is set
    pub async fn sweep(
        &self,
        samples: &dyn SampleSource,
        tiers: &dyn TierStore,
        now: DateTime<Utc>,
        dry_run: bool,
    ) -> RetentionReport {
        let mut entries = Vec::with_capacity(4);

        for target in RetentionTarget::all() {
            let Some(cutoff) = self.cutoff(target, now) else {
                entries.push(RetentionEntry {
                    target,
                    cutoff: None,
                    outcome: RetentionOutcome::Unbounded,
                });
                continue;
            };

            let result = match (target, dry_run) {
                (RetentionTarget::Raw, false) => samples.delete_samples_older_than(cutoff).await,
                (RetentionTarget::Raw, true) => samples.count_samples_older_than(cutoff).await,
                (RetentionTarget::Tier(tier), false) => tiers.delete_older_than(tier, cutoff).await,
                (RetentionTarget::Tier(tier), true) => tiers.count_older_than(tier, cutoff).await,
            };

            let outcome = match result {
                Ok(n) => {
                    if n > 0 {
                        log::debug!("   ├─ {}: {} rows older than {}", target, n, cutoff);
                    }
                    RetentionOutcome::Purged(n)
                }
                Err(e) => {
                    log::error!("❌ Retention failed for {} store: {}", target, e);
                    RetentionOutcome::Failed(e)
                }
            };
            entries.push(RetentionEntry {
                target,
                cutoff: Some(cutoff),
                outcome,
            });
        }

        RetentionReport { now, dry_run, entries }
    }
}
