//! Clock context trait for DroneWatch report handlers.

use chrono::{DateTime, Utc};
use std::time::{Duration, SystemTime};

/// Compact UTC timestamp format used in row keys and downstream tuples.
///
/// Example: `20240101000000000000` (microsecond precision, no separators).
pub const DTFMT: &str = "%Y%m%d%H%M%S%6f";

/// The clock seen by a report handler.
///
/// This trait abstracts wall-clock time so that the same handler code runs
/// against the system clock in production and against a virtual clock in
/// simulation.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `Instant` and `SystemTime`
/// - **Simulation**: `SimContext` - virtual clock advanced by the scenario runner
///
/// # Determinism
///
/// Every timestamp a handler writes (Cartesian record time, proximity
/// computation time) comes from this trait, so a virtual clock makes the
/// full record stream reproducible.
pub trait WatchContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time for record timestamps.
    ///
    /// In simulation, this is derived from virtual clock + epoch offset.
    fn system_time(&self) -> SystemTime;

    /// Returns the wall-clock time as a UTC datetime.
    fn utc_now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.system_time())
    }
}

/// Formats a datetime in the compact [`DTFMT`] layout.
pub fn format_stamp(t: &DateTime<Utc>) -> String {
    t.format(DTFMT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    struct FixedClock(SystemTime);

    impl WatchContext for FixedClock {
        fn now(&self) -> Duration {
            Duration::ZERO
        }

        fn system_time(&self) -> SystemTime {
            self.0
        }
    }

    #[test]
    fn test_format_stamp_layout() {
        // 2024-01-01 00:00:00.000123 UTC
        let t = UNIX_EPOCH + Duration::from_secs(1704067200) + Duration::from_micros(123);
        let clock = FixedClock(t);

        assert_eq!(format_stamp(&clock.utc_now()), "20240101000000000123");
    }

    #[test]
    fn test_format_stamp_sorts_chronologically() {
        let early = FixedClock(UNIX_EPOCH + Duration::from_secs(1704067200));
        let late = FixedClock(UNIX_EPOCH + Duration::from_secs(1704067201));

        assert!(format_stamp(&early.utc_now()) < format_stamp(&late.utc_now()));
    }
}
