//! # Capture Timestamps
//!
//! Replay paths address captures by a 14-digit UTC timestamp
//! (`YYYYMMDDhhmmss`). Shorter prefixes are accepted and padded: a missing
//! month or day becomes `01`, missing time fields become `0`, and a lone
//! tens digit of a month or day is completed to the first month or day it
//! covers.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Maximum number of digits in a capture timestamp.
pub const TIMESTAMP_LEN: usize = 14;

const PAD_TEMPLATE: &str = "10000101000000";

/// Whether `s` is a (possibly partial) capture timestamp.
pub fn is_timestamp(s: &str) -> bool {
    !s.is_empty() && s.len() <= TIMESTAMP_LEN && s.bytes().all(|b| b.is_ascii_digit())
}

/// Pad a partial timestamp to 14 digits. Returns `None` if `ts` is not a
/// timestamp.
pub fn pad_timestamp(ts: &str) -> Option<String> {
    if !is_timestamp(ts) {
        return None;
    }
    let mut padded = String::with_capacity(TIMESTAMP_LEN);
    padded.push_str(ts);
    // A lone month or day digit is the tens place; month and day 00 do not exist.
    if ts.len() == 5 || ts.len() == 7 {
        padded.push(if ts.ends_with('0') { '1' } else { '0' });
    }
    padded.push_str(&PAD_TEMPLATE[padded.len()..]);
    Some(padded)
}

/// Convert a (possibly partial) timestamp to a UTC datetime.
pub fn timestamp_to_datetime(ts: &str) -> Option<DateTime<Utc>> {
    let padded = pad_timestamp(ts)?;
    let naive = NaiveDateTime::parse_from_str(&padded, "%Y%m%d%H%M%S").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Format a UTC datetime as a 14-digit timestamp.
pub fn datetime_to_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%d%H%M%S").to_string()
}

/// RFC 7231 `HTTP-date` form, used for `Memento-Datetime`.
pub fn http_date(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
