//! The single encode/decode pair used at every persistence boundary. Dates
//! round-trip through RFC 3339 with an explicit UTC offset so that a reloaded
//! value is the same instant, not a calendar-day approximation.

use chrono::{DateTime, Utc};

pub fn encode_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339()
}

pub fn decode_instant(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|t| t.with_timezone(&Utc))
}
