//! Small helpers shared by the cache, the diff builder and the CLI.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat};

/// `2025-01-01T00:00:00Z` for a Unix timestamp in seconds.
///
/// Timestamps chrono cannot represent render as `invalid-timestamp(N)`.
pub fn format_timestamp_iso8601(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| format!("invalid-timestamp({timestamp})"))
}

/// Seconds since the Unix epoch.
///
/// `TREELINE_TEST_EPOCH` pins the value so cached snapshots are reproducible
/// in tests. A clock set before 1970 reads as 0.
pub fn get_now() -> u64 {
    if let Some(epoch) = std::env::var("TREELINE_TEST_EPOCH")
        .ok()
        .and_then(|val| val.parse().ok())
    {
        return epoch;
    }
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Truncate `text` to at most `max_bytes`, backing off to the nearest char
/// boundary so multi-byte characters are never split.
pub fn truncate_at_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
