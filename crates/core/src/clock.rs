// SPDX-License-Identifier: MIT

//! Clock abstraction so the supervisor's timed loops (heartbeat, stats
//! sampling, probing) and the daemon's reconciliation loop can be driven
//! deterministically in tests instead of sleeping on the wall clock.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn epoch_ms(&self) -> u64;
}

#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A manually-advanced clock for tests exercising timeout/probe/retry logic
/// without real sleeps.
#[derive(Clone)]
pub struct FakeClock {
    current: Arc<Mutex<Instant>>,
    epoch_ms: Arc<Mutex<u64>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(Instant::now())),
            epoch_ms: Arc::new(Mutex::new(0)),
        }
    }

    pub fn advance(&self, delta: std::time::Duration) {
        *self.current.lock() += delta;
        *self.epoch_ms.lock() += delta.as_millis() as u64;
    }

    pub fn set_epoch_ms(&self, epoch_ms: u64) {
        *self.epoch_ms.lock() = epoch_ms;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }

    fn epoch_ms(&self) -> u64 {
        *self.epoch_ms.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fake_clock_advances_monotonic_and_epoch_together() {
        let clock = FakeClock::new();
        let t0 = clock.now();
        clock.advance(Duration::from_secs(5));
        assert!(clock.now() > t0);
        assert_eq!(clock.epoch_ms(), 5_000);
    }
}
