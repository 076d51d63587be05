//! Timing utilities

use std::time::{SystemTime, UNIX_EPOCH};

/// Timestamp type (microseconds since the Unix epoch)
pub type Timestamp = u64;

/// Get current Unix timestamp in microseconds
pub fn now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as Timestamp)
        .unwrap_or_default()
}

/// Whole seconds elapsed between two timestamps, saturating at zero
pub fn elapsed_secs(since: Timestamp, until: Timestamp) -> u64 {
    until.saturating_sub(since) / 1_000_000
}
