//! General utilities shared across the application.

use std::time::{SystemTime, UNIX_EPOCH};

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Seconds elapsed between two millisecond timestamps.
///
/// Clamps to zero when `later` precedes `earlier` (wall clock stepped back).
#[must_use]
pub fn elapsed_secs(earlier: u64, later: u64) -> f64 {
    later.saturating_sub(earlier) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_secs_converts_millis() {
        assert_eq!(elapsed_secs(1_000, 3_500), 2.5);
    }

    #[test]
    fn elapsed_secs_never_negative() {
        assert_eq!(elapsed_secs(5_000, 4_000), 0.0);
    }
}
