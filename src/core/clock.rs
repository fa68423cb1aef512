//! Injectable wall-clock abstraction.
//!
//! All time arithmetic in the service (lease deadlines, retention expiry,
//! signed-URL windows, audit timestamps) goes through a [`Clock`] so tests
//! can pin or advance time deterministically.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

/// A source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock pinned to an explicit instant.
///
/// The instant can be moved forward with [`FixedClock::advance`] to exercise
/// deadline and expiry behavior without sleeping.
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a clock pinned to `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.write();
        *now = *now + delta;
    }

    /// Pin the clock to a new instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.write() = instant;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}
