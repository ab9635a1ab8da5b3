//! Wall-clock and monotonic time source, injectable for deterministic tests.
//!
//! No component in this workspace is permitted to call `Utc::now()` or
//! `Instant::now()` directly outside of [`SystemClock`] — every timeout,
//! retry backoff, and lease expiry reads through a `Arc<dyn Clock>` passed
//! in at construction time.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Time source abstraction. `now()` is wall-clock (used for persisted
/// timestamps and comparisons); `monotonic()` is elapsed time since the
/// clock was created (used for in-process interval math that must not
/// jump backwards if the wall clock is adjusted).
pub trait Clock: fmt::Debug + Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn monotonic(&self) -> Duration;
}

/// The real clock. Cheap to clone; wrap in `Arc` when a trait object is
/// needed.
#[derive(Debug, Clone, Default)]
pub struct SystemClock {
    start: Option<std::time::Instant>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Some(std::time::Instant::now()),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> Duration {
        self.start
            .unwrap_or_else(std::time::Instant::now)
            .elapsed()
    }
}

/// A fake clock for tests: wall time only advances when [`FakeClock::advance`]
/// is called. Cloning shares the same underlying time (it's an `Arc`).
#[derive(Debug, Clone)]
pub struct FakeClock {
    inner: Arc<Mutex<FakeClockState>>,
}

#[derive(Debug)]
struct FakeClockState {
    now: DateTime<Utc>,
    elapsed: Duration,
}

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeClockState {
                now: start,
                elapsed: Duration::ZERO,
            })),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.inner.lock().expect("fake clock poisoned");
        state.now += chrono::Duration::from_std(by).expect("duration too large");
        state.elapsed += by;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        let mut state = self.inner.lock().expect("fake clock poisoned");
        state.now = now;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.lock().expect("fake clock poisoned").now
    }

    fn monotonic(&self) -> Duration {
        self.inner.lock().expect("fake clock poisoned").elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_deterministically() {
        let start = Utc::now();
        let clock = FakeClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(30));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(30));
        assert_eq!(clock.monotonic(), Duration::from_secs(30));
    }

    #[test]
    fn fake_clock_clones_share_state() {
        let clock = FakeClock::new(Utc::now());
        let clone = clock.clone();
        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now(), clone.now());
    }

    #[test]
    fn system_clock_monotonic_is_non_decreasing() {
        let clock = SystemClock::new();
        let a = clock.monotonic();
        std::thread::sleep(Duration::from_millis(5));
        let b = clock.monotonic();
        assert!(b >= a);
    }
}
