//! Exponential backoff with jitter for job retries.

use std::time::Duration;

/// `backoff(n) = min(cap, base * 2^(n-1)) * U(0.5, 1.5)`.
///
/// Registered per handler so noisy handlers can widen their cap without
/// affecting the rest of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(5 * 60),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// `attempts` is the number of attempts already made (1-indexed, as
    /// recorded on the job after incrementing). Jitter is drawn from
    /// `fastrand` — callers in tests that need determinism should seed it
    /// or assert on bounds rather than exact values.
    pub fn delay_for(&self, attempts: i32) -> Duration {
        let exp = attempts.saturating_sub(1).clamp(0, 32) as u32;
        let unjittered = self.base.saturating_mul(1u32.checked_shl(exp).unwrap_or(u32::MAX));
        let unjittered = unjittered.min(self.cap);

        let jitter = 0.5 + fastrand::f64();
        Duration::from_secs_f64(unjittered.as_secs_f64() * jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respects_cap() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(10));
        for attempt in 1..20 {
            let delay = policy.delay_for(attempt);
            assert!(delay <= Duration::from_secs_f64(15.0), "attempt {attempt} delay {delay:?}");
        }
    }

    #[test]
    fn grows_before_cap() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(300));
        let d1 = policy.delay_for(1);
        let d2 = policy.delay_for(2);
        assert!(d1 <= Duration::from_secs_f64(1.5));
        assert!(d2 <= Duration::from_secs_f64(3.0));
    }
}
