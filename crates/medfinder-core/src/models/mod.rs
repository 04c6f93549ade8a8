//! Domain models for medication supply tracking.

mod geography;
mod medication;
mod organization;
mod provider;
mod supply;
mod user;

pub use geography::*;
pub use medication::*;
pub use organization::*;
pub use provider::*;
pub use supply::*;
pub use user::*;

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp the way every table stores it.
///
/// Second precision with a `Z` suffix keeps stored values lexicographically
/// ordered, so range filters can compare the text directly.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current time in storage format.
pub fn now_timestamp() -> String {
    timestamp(Utc::now())
}

/// Parse a stored timestamp back into UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Global epidemic banner flag.
///
/// Public health supplies are only shown to the public while it is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Epidemic {
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_round_trip_is_ordered() {
        let early = Utc.with_ymd_and_hms(2024, 1, 9, 23, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 10, 1, 0, 0).unwrap();

        assert_eq!(timestamp(early), "2024-01-09T23:00:00Z");
        assert!(timestamp(early) < timestamp(late));
        assert_eq!(parse_timestamp(&timestamp(late)), Some(late));
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
    }
}
