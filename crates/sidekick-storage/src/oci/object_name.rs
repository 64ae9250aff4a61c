//! Object naming
//!
//! Objects land under `{prefix}/{YYYY-MM-DD}/{timestamp}.json` where the
//! timestamp is RFC 3339 in UTC with nanosecond precision and trailing zeros
//! of the fraction removed (`2024-10-15T14:30:00.1234Z`).

use chrono::{DateTime, Datelike, Timelike, Utc};
use std::fmt::Write;

/// Day partition of an instant, `YYYY-MM-DD`
pub fn date_partition(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// RFC 3339 timestamp with trimmed nanosecond fraction
pub fn rfc3339_nano(at: &DateTime<Utc>) -> String {
    let mut out = format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
        at.year(),
        at.month(),
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    );

    // chrono encodes a leap second as nanos >= 1_000_000_000
    let nanos = at.nanosecond().min(999_999_999);
    if nanos > 0 {
        let fraction = format!("{:09}", nanos);
        let _ = write!(out, ".{}", fraction.trim_end_matches('0'));
    }
    out.push('Z');
    out
}

/// Object name for an event stored at `at`.
///
/// The prefix is used as given; an empty prefix yields a leading `/`.
pub fn object_name(prefix: &str, at: &DateTime<Utc>) -> String {
    format!(
        "{}/{}/{}.json",
        prefix.trim(),
        date_partition(at),
        rfc3339_nano(at)
    )
}
