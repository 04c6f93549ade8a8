//! Supply reports: one row per provider, NDC and report time.

use serde::{Deserialize, Serialize};

/// Map a reported supply string to its ordinal level.
///
/// Unknown strings (including "NO SUPPLY") map to level 0.
pub fn supply_to_level(supply: &str) -> u8 {
    match supply.trim() {
        "<24" => 1,
        "24" => 2,
        "24-48" => 3,
        ">48" => 4,
        _ => 0,
    }
}

/// A time-stamped supply fact for one provider and one NDC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupplyReport {
    pub id: i64,
    pub provider_id: i64,
    pub medication_ndc_id: Option<i64>,
    /// Raw supply string as reported (`<24`, `24`, `24-48`, `>48`)
    pub supply: String,
    /// Level derived from `supply`, 0..=4
    pub level: u8,
    pub creation_date: String,
    pub last_modified: String,
    /// Most recent report for this provider/NDC pair
    pub latest: bool,
}

impl SupplyReport {
    /// New report stamped now; the level is derived from the supply string.
    pub fn new(provider_id: i64, medication_ndc_id: i64, supply: impl Into<String>) -> Self {
        let supply = supply.into();
        let now = super::now_timestamp();
        Self {
            id: 0,
            provider_id,
            medication_ndc_id: Some(medication_ndc_id),
            level: supply_to_level(&supply),
            supply,
            creation_date: now.clone(),
            last_modified: now,
            latest: false,
        }
    }

    /// Override both timestamps, used by imports that carry a report time.
    pub fn at(mut self, timestamp: impl Into<String>) -> Self {
        let timestamp = timestamp.into();
        self.creation_date = timestamp.clone();
        self.last_modified = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supply_to_level() {
        assert_eq!(supply_to_level("<24"), 1);
        assert_eq!(supply_to_level("24"), 2);
        assert_eq!(supply_to_level("24-48"), 3);
        assert_eq!(supply_to_level(">48"), 4);
        assert_eq!(supply_to_level(" >48 "), 4);
        assert_eq!(supply_to_level("NO SUPPLY"), 0);
        assert_eq!(supply_to_level(""), 0);
    }

    #[test]
    fn test_new_report_derives_level() {
        let report = SupplyReport::new(1, 2, "24-48");
        assert_eq!(report.level, 3);
        assert!(!report.latest);
        assert_eq!(report.creation_date, report.last_modified);
    }
}
