//! [`Scheduler`]: a periodic driver that enqueues due recurring jobs and
//! runs lease reclamation, independent of the worker pool's claim loop.

use std::sync::Arc;
use std::time::Duration;

use hearth_core::Clock;
use hearth_persistence::Store;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::SchedulerConfig;
use crate::queue::{EnqueueRequest, JobQueue};

pub struct Scheduler {
    config: SchedulerConfig,
    queue: Arc<JobQueue>,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, queue: Arc<JobQueue>, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { config, queue, store, clock, shutdown: CancellationToken::new() }
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub async fn run(self) {
        info!("scheduler starting, tick={:?}", self.config.tick);
        loop {
            if let Err(e) = self.tick().await {
                error!(error = %e, "scheduler tick failed");
            }

            let jitter = Duration::from_millis(fastrand::u64(0..self.config.jitter_max_secs.saturating_mul(1000).max(1)));
            tokio::select! {
                _ = tokio::time::sleep(self.config.tick + jitter) => {}
                _ = self.shutdown.cancelled() => break,
            }
        }
        info!("scheduler stopped");
    }

    /// One tick: enqueue `recurrence.expand` for every active schedule
    /// (coalesced via a tick-bucket idempotency key), reclaim expired
    /// leases, and optionally enqueue garbage collection.
    async fn tick(&self) -> hearth_core::HearthResult<()> {
        let now = self.clock.now();
        let tick_bucket = now.timestamp() / self.config.tick.as_secs().max(1) as i64;

        let schedules = self.store.list_active_schedules().await?;
        for schedule in schedules {
            let idempotency_key = format!("expand:{}:{}", schedule.id, tick_bucket);
            let req = EnqueueRequest::new("recurrence", "recurrence.expand", serde_json::json!({ "schedule_id": schedule.id }))
                .with_idempotency_key(idempotency_key);
            if let Err(e) = self.queue.enqueue(req).await {
                debug!(schedule_id = %schedule.id, error = %e, "failed to enqueue expansion");
            }
        }

        let reclaimed = self.queue.reclaim_expired().await?;
        if reclaimed > 0 {
            debug!(reclaimed, "reclaimed expired leases");
        }

        if self.config.enqueue_gc {
            let gc_key = format!("gc:{tick_bucket}");
            let req = EnqueueRequest::new("maintenance", "job.prune", serde_json::json!({}))
                .with_idempotency_key(gc_key);
            if let Err(e) = self.queue.enqueue(req).await {
                debug!(error = %e, "failed to enqueue gc job");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::{FakeClock, Recurrence, ScheduleDefinition};
    use hearth_persistence::InMemoryStore;
    use uuid::Uuid;

    #[tokio::test]
    async fn tick_enqueues_expansion_for_active_schedules() {
        let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let registry = Arc::new(crate::registry::HandlerRegistry::new());
        let queue = Arc::new(JobQueue::new(store.clone(), clock.clone(), registry));

        let schedule = ScheduleDefinition {
            id: Uuid::new_v4(),
            family_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "Take out trash".into(),
            description: None,
            task_type: "chore".into(),
            default_priority: 0,
            default_assignee: None,
            recurrence: Recurrence::Daily,
            timezone: "UTC".into(),
            start_date: clock.now().date_naive(),
            end_date: None,
            horizon_days: 14,
            active: true,
        };
        store.insert_schedule(schedule).await.unwrap();

        let scheduler = Scheduler::new(SchedulerConfig::default(), queue.clone(), store.clone(), clock);
        scheduler.tick().await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending, 2);
    }

    #[tokio::test]
    async fn repeated_ticks_in_same_bucket_coalesce() {
        let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let registry = Arc::new(crate::registry::HandlerRegistry::new());
        let queue = Arc::new(JobQueue::new(store.clone(), clock.clone(), registry));

        let schedule = ScheduleDefinition {
            id: Uuid::new_v4(),
            family_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "Water plants".into(),
            description: None,
            task_type: "chore".into(),
            default_priority: 0,
            default_assignee: None,
            recurrence: Recurrence::Daily,
            timezone: "UTC".into(),
            start_date: clock.now().date_naive(),
            end_date: None,
            horizon_days: 14,
            active: true,
        };
        store.insert_schedule(schedule).await.unwrap();

        let scheduler = Scheduler::new(SchedulerConfig::default(), queue.clone(), store.clone(), clock);
        scheduler.tick().await.unwrap();
        scheduler.tick().await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending, 2, "second tick in the same bucket should coalesce via idempotency key");
    }
}
