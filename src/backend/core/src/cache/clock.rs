//! Clock adapters for time operations.
//!
//! `SystemClock` is used in production. `MockClock` is available in test
//! builds or with the `test-helpers` feature:
//!
//! ```toml
//! [dev-dependencies]
//! lumen-core = { version = "*", features = ["test-helpers"] }
//! ```

use std::fmt::Debug;
use std::time::Instant;

/// Source of the current instant.
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// System clock implementation using `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually driven clock for deterministic window tests.
///
/// Clones share the same underlying instant, so advancing one clone advances
/// all of them.
///
/// ```
/// use lumen_core::cache::{Clock, MockClock};
/// use std::time::{Duration, Instant};
///
/// let start = Instant::now();
/// let clock = MockClock::new(start);
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now(), start + Duration::from_secs(10));
/// ```
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug, Clone)]
pub struct MockClock {
    current_time: std::sync::Arc<parking_lot::Mutex<Instant>>,
}

#[cfg(any(test, feature = "test-helpers"))]
impl MockClock {
    /// Create a mock clock starting at a specific instant.
    pub fn new(start: Instant) -> Self {
        Self {
            current_time: std::sync::Arc::new(parking_lot::Mutex::new(start)),
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: std::time::Duration) {
        *self.current_time.lock() += duration;
    }

    /// Set the clock to a specific instant.
    pub fn set(&self, instant: Instant) {
        *self.current_time.lock() = instant;
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Default for MockClock {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.current_time.lock()
    }
}
