//! Wall-clock helpers

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as unix epoch milliseconds.
///
/// A clock set before the epoch reads as 0 rather than failing.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
