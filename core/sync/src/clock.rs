//! Wall-clock sources.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dripsync_common::UtcMillis;

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    /// Current time in UTC milliseconds.
    fn now(&self) -> UtcMillis;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UtcMillis {
        Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for deterministic tests and simulations.
///
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: UtcMillis) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: UtcMillis) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move time forward by `ms`.
    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> UtcMillis {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_shared() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();

        other.advance(500);
        assert_eq!(clock.now(), 1_500);

        clock.set(10);
        assert_eq!(other.now(), 10);
    }

    #[test]
    fn test_system_clock_is_recent() {
        // 2023-11-14, well before any machine running these tests.
        assert!(SystemClock.now() > 1_700_000_000_000);
    }
}
