//! # Time Source
//!
//! Every deadline in Ballast (redemption delay, NAV staleness, proposal
//! expiry) is a timestamp comparison against "now". Where "now" comes from
//! is a capability handed to the treasury at construction: the wall clock
//! in production, a [`ManualClock`] in tests so that a one-day redemption
//! delay doesn't take one day to test.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// Anything that can tell the time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same instant, so a test can keep one handle while the
/// treasury owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Starts the clock at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Moves the clock forward (or backward, if you insist) by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Jumps to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Converts a `std::time::Duration` config value into a `chrono::Duration`
/// at whole-second granularity, saturating at chrono's maximum.
pub fn to_chrono(duration: std::time::Duration) -> Duration {
    let secs = duration.as_secs().min(i64::MAX as u64 / 1_000);
    Duration::seconds(secs as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_clones_share_time() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        let handle = clock.clone();

        handle.advance(Duration::hours(25));
        assert_eq!(clock.now(), start + Duration::hours(25));

        clock.set(start);
        assert_eq!(handle.now(), start);
    }

    #[test]
    fn std_durations_convert() {
        assert_eq!(to_chrono(std::time::Duration::from_secs(3600)), Duration::hours(1));
    }
}
