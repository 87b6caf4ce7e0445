//! Timestamp helpers.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC text with microsecond
//! precision, so lexical order in SQL matches chronological order.

use chrono::{NaiveDate, Utc};

pub fn now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Parse a `YYYY-MM-DD` date, as used by `met_at` and list filters.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Lower bound for "created on or after `date`".
pub fn start_of_day(date: NaiveDate) -> String {
    format!("{}T00:00:00.000000Z", date.format("%Y-%m-%d"))
}

/// Upper bound for "created on or before `date`".
pub fn end_of_day(date: NaiveDate) -> String {
    format!("{}T23:59:59.999999Z", date.format("%Y-%m-%d"))
}
