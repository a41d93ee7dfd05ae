//! Clock abstraction for deterministic event timestamps.

use chrono::{DateTime, SubsecRound, Utc};

/// Abstraction over system time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the current time rounded to millisecond precision, the
    /// resolution events are stamped with.
    fn now_millis(&self) -> DateTime<Utc> {
        self.now().round_subsecs(3)
    }
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
