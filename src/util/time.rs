//! Time utilities for game simulation

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Convert a duration in fractional seconds to whole milliseconds
pub fn secs_to_millis(secs: f32) -> u64 {
    (secs.max(0.0) * 1000.0) as u64
}

/// The countdown task always runs at one-second resolution
pub const COUNTDOWN_RESOLUTION_MS: u64 = 1_000;

/// Heartbeat broadcast interval in milliseconds
pub const HEARTBEAT_INTERVAL_MS: u64 = 1_000;
