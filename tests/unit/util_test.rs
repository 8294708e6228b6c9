//! Tests for utility functions

use chrono::{Duration, TimeZone, Utc};
use pipeline_scheduler::util::{init_tracing, now, now_ms, to_iso};

#[test]
fn test_to_iso_uses_millisecond_precision() {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap() + Duration::milliseconds(42);
    assert_eq!(to_iso(at), "2024-03-01T12:30:00.042Z");
}

#[test]
fn test_iso_strings_order_chronologically() {
    let base = now();
    let stamps: Vec<String> = [0, 1, 999, 1000, 86_400_000]
        .into_iter()
        .map(|ms| to_iso(base + Duration::milliseconds(ms)))
        .collect();
    let mut sorted = stamps.clone();
    sorted.sort();
    assert_eq!(stamps, sorted);
}

#[test]
fn test_now_ms_tracks_wall_clock() {
    let before = u128::try_from(Utc::now().timestamp_millis()).unwrap();
    let value = now_ms();
    assert!(value >= before);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}
