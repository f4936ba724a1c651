//! Wall-clock access for cache expiry.
//!
//! The cache stores absolute timestamps, so it needs epoch milliseconds rather
//! than a monotonic instant. Tests drive a [`FakeClock`] instead.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current time in milliseconds since the Unix epoch
pub trait Clock: Send + Sync + Debug {
    /// Current time in milliseconds since the Unix epoch
    fn now_ms(&self) -> u64;
}

/// Clock backed by [`SystemTime`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for deterministic tests
#[derive(Debug, Default)]
pub struct FakeClock {
    current_ms: AtomicU64,
}

impl FakeClock {
    /// Create a fake clock fixed at `time_ms`
    #[must_use]
    pub fn new(time_ms: u64) -> Self {
        Self {
            current_ms: AtomicU64::new(time_ms),
        }
    }

    /// Create a shared fake clock
    #[must_use]
    pub fn shared(time_ms: u64) -> Arc<Self> {
        Arc::new(Self::new(time_ms))
    }

    /// Set the current time
    pub fn set_ms(&self, time_ms: u64) {
        self.current_ms.store(time_ms, Ordering::SeqCst);
    }

    /// Fast forward by a duration
    pub fn advance(&self, duration: Duration) {
        self.advance_ms(duration.as_millis() as u64);
    }

    /// Fast forward by milliseconds
    pub fn advance_ms(&self, ms: u64) {
        self.current_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.current_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn test_fake_clock_advance() {
        let clock = FakeClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now_ms(), 3_000);
        clock.advance_ms(5);
        assert_eq!(clock.now_ms(), 3_005);
    }

    #[test]
    fn test_fake_clock_set() {
        let clock = FakeClock::shared(0);
        clock.set_ms(42);
        assert_eq!(clock.now_ms(), 42);
    }
}
