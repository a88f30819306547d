//! Wall-clock helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in Unix milliseconds. A clock before the epoch reads as 0.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
