//! Eligibility strategies
//!
//! A strategy decides whether a non-manual trigger should proceed given the
//! entity key's prior-sync snapshot. Strategies are pure and do no I/O.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use tidemark_domain::constants::DEFAULT_ELIGIBILITY_INTERVAL_SECS;
use tidemark_domain::SyncTrigger;

pub trait EligibilityStrategy: Send + Sync + fmt::Debug {
    fn is_eligible(&self, trigger: &SyncTrigger) -> bool;
}

/// Eligible for every trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlwaysEligible;

impl EligibilityStrategy for AlwaysEligible {
    fn is_eligible(&self, _trigger: &SyncTrigger) -> bool {
        true
    }
}

/// Eligible once `interval` has passed since the key was last leased.
///
/// A key that has never been leased is always eligible, and reaching the
/// interval exactly counts as eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalEligibility {
    interval: Duration,
}

impl IntervalEligibility {
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_eligible_at(&self, trigger: &SyncTrigger, now: DateTime<Utc>) -> bool {
        trigger
            .prior_sync_info
            .last_sync_leased_at
            .map_or(true, |leased_at| now - leased_at >= self.interval)
    }
}

impl Default for IntervalEligibility {
    fn default() -> Self {
        let secs = i64::try_from(DEFAULT_ELIGIBILITY_INTERVAL_SECS).unwrap_or(86_400);
        Self::new(Duration::seconds(secs))
    }
}

impl EligibilityStrategy for IntervalEligibility {
    fn is_eligible(&self, trigger: &SyncTrigger) -> bool {
        self.is_eligible_at(trigger, Utc::now())
    }
}
