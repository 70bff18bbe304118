//! Unix timestamps and UTC day normalization.
//!
//! Manifest keys, history shard keys and retention comparisons all use
//! normalized timestamps: the 00:00:00 UTC instant of the containing day.

use chrono::{DateTime, Utc};

/// Unix time in seconds.
pub type UnixTimestamp = i64;

/// Seconds in one UTC day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Snap a timestamp to 00:00:00 UTC of its day.
///
/// Idempotent: `normalize(normalize(t)) == normalize(t)`. Saturates at
/// `i64::MIN`.
pub const fn normalize(t: UnixTimestamp) -> UnixTimestamp {
    t.saturating_sub(t.rem_euclid(SECONDS_PER_DAY))
}

/// First and last normalized day intersecting the inclusive range
/// `[lower, upper]`; `None` when `lower > upper`.
pub const fn day_span(lower: UnixTimestamp, upper: UnixTimestamp) -> Option<(UnixTimestamp, UnixTimestamp)> {
    if lower > upper {
        return None;
    }
    Some((normalize(lower), normalize(upper)))
}

/// The retention cutoff: anything whose normalized day is strictly
/// earlier than this is expired.
pub const fn retention_cutoff(now: UnixTimestamp, retention_days: i64) -> UnixTimestamp {
    now - retention_days * SECONDS_PER_DAY
}

/// Current Unix time in seconds.
pub fn now() -> UnixTimestamp {
    Utc::now().timestamp()
}

/// Render a timestamp as an RFC 3339 string for logs.
pub fn display(t: UnixTimestamp) -> String {
    DateTime::<Utc>::from_timestamp(t, 0)
        .map_or_else(|| t.to_string(), |dt| dt.to_rfc3339())
}

/// Parse a key's file name (`{ts}.json`, `{ts}.txt.gz`, ...) into a timestamp.
///
/// Only the leading run of digits before the first `.` counts.
pub fn parse_key_timestamp(key: &str) -> Option<UnixTimestamp> {
    let name = key.rsplit('/').next()?;
    let stem = name.split('.').next()?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}
