//! Per-key usage counters

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::plan::{Feature, ResetPeriod};

/// Usage counters for one key within the current reset window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    #[serde(default)]
    counters: BTreeMap<Feature, u64>,
    last_reset: DateTime<Utc>,
}

impl UsageRecord {
    /// A zeroed record whose window starts now
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(last_reset: DateTime<Utc>) -> Self {
        let counters = Feature::ALL.into_iter().map(|f| (f, 0)).collect();
        Self {
            counters,
            last_reset,
        }
    }

    pub fn count(&self, feature: Feature) -> u64 {
        self.counters.get(&feature).copied().unwrap_or(0)
    }

    pub fn last_reset(&self) -> DateTime<Utc> {
        self.last_reset
    }

    /// Add one to a counter, creating it at 1; returns the new value
    pub fn increment(&mut self, feature: Feature) -> u64 {
        let counter = self.counters.entry(feature).or_insert(0);
        *counter = counter.saturating_add(1);
        *counter
    }

    /// Zero every counter and restart the window at `now`
    pub fn reset(&mut self, now: DateTime<Utc>) {
        for counter in self.counters.values_mut() {
            *counter = 0;
        }
        self.last_reset = now;
    }

    pub fn is_reset_due(&self, period: ResetPeriod, now: DateTime<Utc>) -> bool {
        period.is_due(self.last_reset, now)
    }

    /// Apply a due reset; returns true when counters were zeroed
    pub fn reset_if_due(&mut self, period: ResetPeriod, now: DateTime<Utc>) -> bool {
        if self.is_reset_due(period, now) {
            self.reset(now);
            true
        } else {
            false
        }
    }

    /// Counters for every feature, including ones never touched
    pub fn counts(&self) -> impl Iterator<Item = (Feature, u64)> + '_ {
        Feature::ALL.into_iter().map(|f| (f, self.count(f)))
    }
}

impl Default for UsageRecord {
    fn default() -> Self {
        Self::new()
    }
}
