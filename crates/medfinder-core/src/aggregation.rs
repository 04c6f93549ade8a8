//! Supply-level aggregation.
//!
//! Reports carry an ordinal level (0 = none, 1 = low, 2-3 = medium, 4 = high).
//! Any group of reports (a provider, a state, a county, a zipcode, a day) is
//! summarized by tallying levels into buckets and picking a dominant bucket.

use serde::{Deserialize, Serialize};

/// Share of reports a bucket needs before it dominates.
pub const DOMINANCE_THRESHOLD: f64 = 0.85;

/// Supply bucket a level falls into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SupplyBucket {
    None,
    Low,
    Medium,
    High,
}

impl SupplyBucket {
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => SupplyBucket::None,
            1 => SupplyBucket::Low,
            2 | 3 => SupplyBucket::Medium,
            _ => SupplyBucket::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SupplyBucket::None => "none",
            SupplyBucket::Low => "low",
            SupplyBucket::Medium => "medium",
            SupplyBucket::High => "high",
        }
    }
}

/// Per-bucket report counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupplyCounts {
    pub none: u64,
    pub low: u64,
    pub medium: u64,
    pub high: u64,
}

impl SupplyCounts {
    pub fn total(&self) -> u64 {
        self.none + self.low + self.medium + self.high
    }

    /// Count one level.
    pub fn add(&mut self, level: u8) {
        match SupplyBucket::from_level(level) {
            SupplyBucket::None => self.none += 1,
            SupplyBucket::Low => self.low += 1,
            SupplyBucket::Medium => self.medium += 1,
            SupplyBucket::High => self.high += 1,
        }
    }

    /// Count a level `n` times, for pre-grouped rows.
    pub fn add_many(&mut self, level: u8, n: u64) {
        match SupplyBucket::from_level(level) {
            SupplyBucket::None => self.none += n,
            SupplyBucket::Low => self.low += n,
            SupplyBucket::Medium => self.medium += n,
            SupplyBucket::High => self.high += n,
        }
    }

    /// Add another tally into this one.
    pub fn merge(&mut self, other: &SupplyCounts) {
        self.none += other.none;
        self.low += other.low;
        self.medium += other.medium;
        self.high += other.high;
    }

    /// Dominant bucket under `threshold`, `None` when nothing was counted.
    pub fn dominant(&self, threshold: f64) -> Option<SupplyBucket> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let exceeds = |count: u64| count as f64 > threshold * total as f64;

        if exceeds(self.none) {
            Some(SupplyBucket::None)
        } else if exceeds(self.high) {
            Some(SupplyBucket::High)
        } else if exceeds(self.high + self.medium) {
            Some(SupplyBucket::Medium)
        } else {
            Some(SupplyBucket::Low)
        }
    }

    pub fn summarize(self, threshold: f64) -> SupplySummary {
        SupplySummary {
            dominant: self.dominant(threshold),
            supplies: self,
        }
    }
}

/// Counts plus dominant bucket, the shape every view returns.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupplySummary {
    pub supplies: SupplyCounts,
    #[serde(rename = "supply")]
    pub dominant: Option<SupplyBucket>,
}

/// Tally levels and classify them with the default threshold.
pub fn get_supplies<I>(levels: I) -> SupplySummary
where
    I: IntoIterator<Item = u8>,
{
    get_supplies_with_threshold(levels, DOMINANCE_THRESHOLD)
}

/// Tally levels and classify them with a custom threshold.
pub fn get_supplies_with_threshold<I>(levels: I, threshold: f64) -> SupplySummary
where
    I: IntoIterator<Item = u8>,
{
    let mut counts = SupplyCounts::default();
    for level in levels {
        counts.add(level);
    }
    counts.summarize(threshold)
}
