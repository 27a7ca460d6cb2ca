//! Clock abstraction injected into the batch context so tests can pin
//! timestamps deterministically.

use chrono::{DateTime, Utc};

/// A source of the current time. Production code uses [`SystemClock`]; tests
/// pin a fixed instant via [`FixedClock`].
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant. Used by tests that assert on
/// `deployed_at_utc` / `created_at_utc` file contents.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
