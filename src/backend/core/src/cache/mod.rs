//! In-process counter storage used by the rate limiter.
//!
//! - **CounterCache**: bounded key -> count map with per-entry TTL and LRU eviction
//! - **Clock**: time source abstraction so window expiry can be driven by tests

pub mod clock;
pub mod counter;

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "test-helpers"))]
pub use clock::MockClock;
pub use counter::{CounterCache, CounterCacheStats};
