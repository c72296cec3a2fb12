//! Shared utility functions used across multiple modules.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Truncate text to at most 180 characters for log and error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current time as an ISO-8601 UTC string with millisecond precision.
pub fn iso_now() -> String {
    format_iso(Utc::now())
}

/// Format a UTC instant the way JavaScript's `toISOString` does.
pub fn format_iso(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 timestamp into UTC.
pub fn parse_iso(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Convert epoch milliseconds into an ISO-8601 string.
pub fn iso_from_millis(millis: i64) -> Option<String> {
    Utc.timestamp_millis_opt(millis).single().map(format_iso)
}

/// Shift an ISO timestamp backwards by `offset`.
///
/// Returns `None` when `iso` does not parse.
pub fn iso_minus(iso: &str, offset: Duration) -> Option<String> {
    let instant = parse_iso(iso)?;
    let offset = chrono::Duration::from_std(offset).ok()?;
    instant.checked_sub_signed(offset).map(format_iso)
}
