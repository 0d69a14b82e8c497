//! Time utilities for the fleet control plane
//!
//! Stored timestamps use `Option<DateTime<Utc>>` where `None` stands for
//! "never", and per-day counters are keyed by a `YYYYMMDD` stamp in UTC.

use chrono::{DateTime, NaiveDate, Utc};

/// Seconds in one calendar day, the ceiling of any per-day online counter.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Current wall-clock time.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Unix seconds of an optional timestamp, 0 when unset.
pub fn unix_secs(time: Option<DateTime<Utc>>) -> i64 {
    time.map(|t| t.timestamp()).unwrap_or(0)
}

/// Timestamp from unix seconds, `None` for 0 or out-of-range values.
pub fn from_unix_secs(secs: i64) -> Option<DateTime<Utc>> {
    if secs == 0 {
        return None;
    }
    DateTime::from_timestamp(secs, 0)
}

/// The `YYYYMMDD` stamp of the day containing `time`.
pub fn day_stamp(time: DateTime<Utc>) -> String {
    time.format("%Y%m%d").to_string()
}

/// Parse a `YYYYMMDD` stamp.
pub fn parse_day_stamp(stamp: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(stamp, "%Y%m%d").ok()
}
