//! Day arithmetic and timestamp parsing.

use chrono::{DateTime, Utc};

/// Fractional days from `earlier` to `now`, floored at zero
pub fn days_between(earlier: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - earlier).num_milliseconds().max(0);
    millis as f64 / 86_400_000.0
}

/// Parse datetime from RFC 3339 string
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
