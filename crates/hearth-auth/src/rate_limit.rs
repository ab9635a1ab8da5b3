//! Sliding-window rate limit on `Upgrade` attempts, keyed by `user_id`.
//!
//! The counter lives in the `Store` (`upgrade_attempts`) for multi-process
//! correctness; a `DashMap` of per-user locks (the same crate the
//! workspace already depends on for its event bus) serialises the
//! read-modify-write against it in-process, per the append-then-prune
//! design note.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hearth_core::{Clock, HearthError, HearthResult};
use hearth_persistence::Store;
use tokio::sync::Mutex;
use uuid::Uuid;

pub struct RateLimiter {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    window: Duration,
    max_attempts: usize,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, window: Duration, max_attempts: usize) -> Self {
        Self { store, clock, window, max_attempts, locks: DashMap::new() }
    }

    fn lock_for(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.locks.entry(user_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Checks the window, records this attempt if admitted. Returns
    /// `RateLimited` (without recording) if the user is already at
    /// `max_attempts` within the window. Successful upgrades still count,
    /// so callers record even on a later password mismatch.
    pub async fn check_and_record(&self, user_id: Uuid) -> HearthResult<()> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let mut attempts = self.store.get_upgrade_attempts(user_id).await?;
        prune(&mut attempts.attempts, now, self.window);

        if attempts.attempts.len() >= self.max_attempts {
            return Err(HearthError::RateLimited);
        }

        attempts.attempts.push(now);
        self.store.save_upgrade_attempts(attempts).await?;
        Ok(())
    }
}

fn prune(attempts: &mut Vec<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) {
    let cutoff = now - chrono::Duration::from_std(window).unwrap_or_default();
    attempts.retain(|t| *t > cutoff);
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::FakeClock;
    use hearth_persistence::InMemoryStore;

    #[tokio::test]
    async fn admits_up_to_max_then_rate_limits() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let limiter = RateLimiter::new(store, clock, Duration::from_secs(900), 5);
        let user = Uuid::new_v4();

        for _ in 0..5 {
            limiter.check_and_record(user).await.unwrap();
        }
        assert!(matches!(limiter.check_and_record(user).await, Err(HearthError::RateLimited)));
    }

    #[tokio::test]
    async fn window_expiry_admits_again() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let limiter = RateLimiter::new(store, clock.clone(), Duration::from_secs(900), 5);
        let user = Uuid::new_v4();

        for _ in 0..5 {
            limiter.check_and_record(user).await.unwrap();
        }
        clock.advance(Duration::from_secs(901));
        assert!(limiter.check_and_record(user).await.is_ok());
    }

    #[tokio::test]
    async fn boundary_attempt_at_exactly_window_is_admitted() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let limiter = RateLimiter::new(store, clock.clone(), Duration::from_secs(900), 1);
        let user = Uuid::new_v4();

        limiter.check_and_record(user).await.unwrap();
        clock.advance(Duration::from_secs(900) + Duration::from_secs(1));
        assert!(limiter.check_and_record(user).await.is_ok());
    }
}
