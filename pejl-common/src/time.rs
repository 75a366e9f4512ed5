//! Timestamp helpers
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings
//! (`2026-08-06T12:00:00Z`), which keeps SQL string comparison equivalent to
//! chronological comparison for the due-assessment query.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp for storage
pub fn to_db_time(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a stored timestamp, tolerating the non-Z offset form
pub fn from_db_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn db_time_round_trips() {
        let dt = Utc.with_ymd_and_hms(2026, 8, 6, 12, 30, 0).unwrap();
        let s = to_db_time(dt);
        assert_eq!(s, "2026-08-06T12:30:00Z");
        assert_eq!(from_db_time(&s), Some(dt));
    }

    #[test]
    fn db_time_ordering_matches_chronology() {
        let early = Utc.with_ymd_and_hms(2026, 8, 6, 11, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();
        assert!(to_db_time(early) < to_db_time(late));
    }
}
