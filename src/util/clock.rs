//! Wall-clock helpers.
//!
//! Resource documents store their timers (`errorRetry`, `nextUpdate`, ...) as
//! ISO-8601 strings with millisecond precision, so comparing the rendered
//! strings orders them chronologically.

use chrono::{DateTime, SecondsFormat, Utc};

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u128 {
    u128::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Current instant.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Render an instant the way resource documents store timestamps.
#[must_use]
pub fn to_iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
