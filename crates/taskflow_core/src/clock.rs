//! Time source for audit timestamps.
//!
//! Services never call `Utc::now()` directly; feed ordering tests need to
//! control the timeline.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of "now" for every row the services write.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time in UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock with millisecond resolution.
///
/// Each `now()` call returns the current instant and then advances it by
/// `step_ms` (which may be zero).
#[derive(Debug)]
pub struct ManualClock {
    current_ms: AtomicI64,
    step_ms: i64,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn frozen(start: DateTime<Utc>) -> Self {
        Self::stepping(start, 0)
    }

    /// Creates a clock that advances by `step_ms` after every reading.
    pub fn stepping(start: DateTime<Utc>, step_ms: i64) -> Self {
        Self {
            current_ms: AtomicI64::new(start.timestamp_millis()),
            step_ms,
        }
    }

    /// Moves the clock forward by `delta_ms` without taking a reading.
    pub fn advance(&self, delta_ms: i64) {
        self.current_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let ms = self.current_ms.fetch_add(self.step_ms, Ordering::SeqCst);
        Utc.timestamp_millis_opt(ms)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, ManualClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn stepping_clock_advances_after_each_reading() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let clock = ManualClock::stepping(start, 1_000);

        assert_eq!(clock.now(), start);
        assert_eq!(clock.now().timestamp_millis(), start.timestamp_millis() + 1_000);
    }

    #[test]
    fn frozen_clock_only_moves_on_advance() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let clock = ManualClock::frozen(start);

        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start);
        clock.advance(250);
        assert_eq!(clock.now().timestamp_millis(), start.timestamp_millis() + 250);
    }
}
