//! [`JobQueue`]: enqueue, lease, heartbeat, complete, fail, cancel of
//! durable jobs. The retry/backoff policy lives here, not in the `Store` —
//! the store atomically applies whatever outcome the queue has already
//! decided on.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hearth_core::{Clock, HearthError, HearthResult, Job, JobStatus};
use hearth_persistence::{JobFailureUpdate, QueueStats, Store};
use uuid::Uuid;

use crate::registry::HandlerRegistry;

/// Fallback when a job's type has no registration to take a default from
/// (e.g. enqueued ahead of the process that registers its handler).
const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Parameters for `Enqueue`. Mirrors the external enqueue surface.
///
/// `max_attempts` defaults to the enqueued `job_type`'s registered
/// [`crate::HandlerRegistration::max_attempts`] - pass `with_max_attempts`
/// only to override it for this one job.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub queue: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub max_attempts: Option<i32>,
    pub run_at: Option<DateTime<Utc>>,
    pub idempotency_key: Option<String>,
}

impl EnqueueRequest {
    pub fn new(queue: impl Into<String>, job_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            queue: queue.into(),
            job_type: job_type.into(),
            payload,
            priority: 0,
            max_attempts: None,
            run_at: None,
            idempotency_key: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_run_at(mut self, run_at: DateTime<Utc>) -> Self {
        self.run_at = Some(run_at);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// What a handler invocation decided, translated by the worker pool into a
/// `Fail` call. `Fault` represents a panic or an uncaught error, treated as
/// retryable per the worker pool's fault-conversion rule.
#[derive(Debug, Clone)]
pub enum FailureOutcome {
    Retryable(String),
    Terminal(String),
}

pub struct JobQueue {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    registry: Arc<HandlerRegistry>,
}

impl JobQueue {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, registry: Arc<HandlerRegistry>) -> Self {
        Self { store, clock, registry }
    }

    pub async fn enqueue(&self, req: EnqueueRequest) -> HearthResult<Uuid> {
        let now = self.clock.now();
        let scheduled_for = req.run_at.unwrap_or(now);
        let status = if scheduled_for > now { JobStatus::Scheduled } else { JobStatus::Pending };
        let max_attempts = req.max_attempts.unwrap_or_else(|| {
            self.registry.get(&req.job_type).map(|r| r.max_attempts).unwrap_or(DEFAULT_MAX_ATTEMPTS)
        });

        let job = Job {
            id: Uuid::new_v4(),
            queue: req.queue,
            job_type: req.job_type,
            payload: req.payload,
            priority: req.priority,
            status,
            attempts: 0,
            max_attempts,
            scheduled_for,
            lease_expires_at: None,
            worker_id: None,
            last_error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            idempotency_key: req.idempotency_key,
        };

        let inserted = self.store.insert_job(job).await?;
        Ok(inserted.id)
    }

    pub async fn claim(&self, worker_id: &str, queues: &[String], max: usize, lease_ttl: Duration) -> HearthResult<Vec<Job>> {
        let now = self.clock.now();
        self.store.claim_ready(worker_id, queues, max, lease_ttl, now).await
    }

    pub async fn heartbeat(&self, job_id: Uuid, worker_id: &str, lease_ttl: Duration) -> HearthResult<()> {
        let now = self.clock.now();
        self.store.extend_lease(job_id, worker_id, lease_ttl, now).await
    }

    pub async fn complete(&self, job_id: Uuid, worker_id: &str) -> HearthResult<Job> {
        let now = self.clock.now();
        self.store.complete_job(job_id, worker_id, now).await
    }

    /// Increments `attempts`; if still under `max_attempts` (and the
    /// outcome isn't `Terminal`), reschedules with `backoff(attempts)` per
    /// the handler's registered policy; otherwise marks `failed`.
    pub async fn fail(&self, job_id: Uuid, worker_id: &str, outcome: FailureOutcome) -> HearthResult<Job> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| HearthError::NotFound(job_id.to_string()))?;

        let now = self.clock.now();
        let new_attempts = job.attempts + 1;
        let backoff = self.registry.get(&job.job_type).map(|r| r.backoff).unwrap_or_default();
        let retry_at = now + chrono::Duration::from_std(backoff.delay_for(new_attempts)).unwrap_or_default();
        let update = Self::failure_update(&job, now, outcome, retry_at);
        self.store.fail_running_job(job_id, worker_id, update).await
    }

    /// Builds the `JobFailureUpdate` for a job failing from `job.attempts`,
    /// given the `scheduled_for` a retry (as opposed to a terminal failure)
    /// should use. Shared by `fail` (backoff-delayed retry) and
    /// `reclaim_expired` (immediately eligible retry, no backoff).
    fn failure_update(job: &Job, now: DateTime<Utc>, outcome: FailureOutcome, retry_scheduled_for: DateTime<Utc>) -> JobFailureUpdate {
        let new_attempts = job.attempts + 1;
        let (message, terminal) = match outcome {
            FailureOutcome::Retryable(msg) => (msg, false),
            FailureOutcome::Terminal(msg) => (msg, true),
        };

        if !terminal && new_attempts < job.max_attempts {
            JobFailureUpdate {
                new_status: JobStatus::Pending,
                attempts: new_attempts,
                scheduled_for: retry_scheduled_for,
                last_error: message,
            }
        } else {
            JobFailureUpdate {
                new_status: JobStatus::Failed,
                attempts: job.max_attempts.max(new_attempts),
                scheduled_for: now,
                last_error: message,
            }
        }
    }

    pub async fn cancel(&self, job_id: Uuid) -> HearthResult<Job> {
        let now = self.clock.now();
        self.store.cancel_job(job_id, now).await
    }

    pub async fn cancel_requested(&self, job_id: Uuid) -> HearthResult<bool> {
        self.store.cancel_requested(job_id).await
    }

    /// Treats every `running` job whose lease has expired as a
    /// fault-equivalent failure: attempts increment, and the job
    /// reschedules immediately (no backoff - a dead worker's lease expiring
    /// isn't the handler asking for a delay) or terminates if that was its
    /// last attempt.
    pub async fn reclaim_expired(&self) -> HearthResult<u64> {
        let now = self.clock.now();
        let expired = self.store.list_expired_leases(now).await?;
        let mut reclaimed = 0u64;

        for job in expired {
            let worker_id = match job.worker_id.as_deref() {
                Some(w) => w.to_string(),
                None => continue,
            };
            let update = Self::failure_update(&job, now, FailureOutcome::Retryable("lease expired".into()), now);
            // Lease-holder race: another worker may have completed/extended
            // between the list and this call. `NotLeaseHolder` there just
            // means the job already moved on; not our job to reclaim.
            match self.store.fail_running_job(job.id, &worker_id, update).await {
                Ok(_) => reclaimed += 1,
                Err(HearthError::NotLeaseHolder) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(reclaimed)
    }

    pub async fn prune_terminal(&self, older_than: DateTime<Utc>) -> HearthResult<u64> {
        self.store.prune_terminal_jobs(older_than).await
    }

    pub async fn stats(&self) -> HearthResult<QueueStats> {
        self.store.queue_stats().await
    }

    pub async fn get_job(&self, id: Uuid) -> HearthResult<Option<Job>> {
        self.store.get_job(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::FakeClock;
    use hearth_persistence::InMemoryStore;

    fn queue_with(clock: Arc<FakeClock>) -> JobQueue {
        JobQueue::new(Arc::new(InMemoryStore::new()), clock, Arc::new(HandlerRegistry::new()))
    }

    #[tokio::test]
    async fn idempotent_enqueue_returns_same_id() {
        let queue = queue_with(Arc::new(FakeClock::new(Utc::now())));
        let req1 = EnqueueRequest::new("default", "x", serde_json::json!({})).with_idempotency_key("k");
        let req2 = EnqueueRequest::new("default", "x", serde_json::json!({})).with_idempotency_key("k");
        let id1 = queue.enqueue(req1).await.unwrap();
        let id2 = queue.enqueue(req2).await.unwrap();
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn retry_then_terminal_failure() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let queue = queue_with(clock.clone());
        let id = queue
            .enqueue(EnqueueRequest::new("default", "x", serde_json::json!({})).with_max_attempts(2))
            .await
            .unwrap();

        let claimed = queue.claim("w1", &[], 1, Duration::from_secs(60)).await.unwrap();
        assert_eq!(claimed.len(), 1);

        let job = queue.fail(id, "w1", FailureOutcome::Retryable("boom".into())).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 1);

        clock.advance(Duration::from_secs(600));
        let claimed = queue.claim("w1", &[], 1, Duration::from_secs(60)).await.unwrap();
        assert_eq!(claimed.len(), 1);

        let job = queue.fail(id, "w1", FailureOutcome::Retryable("boom again".into())).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 2);
    }

    #[tokio::test]
    async fn reclaim_expired_reschedules() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let queue = queue_with(clock.clone());
        let id = queue
            .enqueue(EnqueueRequest::new("default", "x", serde_json::json!({})))
            .await
            .unwrap();
        queue.claim("w1", &[], 1, Duration::from_secs(10)).await.unwrap();

        clock.advance(Duration::from_secs(20));
        let reclaimed = queue.reclaim_expired().await.unwrap();
        assert_eq!(reclaimed, 1);

        let job = queue.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.attempts, 1);
        assert_eq!(job.status, JobStatus::Pending);

        let claimed = queue.claim("w2", &[], 1, Duration::from_secs(10)).await.unwrap();
        assert_eq!(claimed[0].id, id);
        let job = queue.complete(id, "w2").await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn terminal_outcome_forces_failed_even_under_max_attempts() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let queue = queue_with(clock);
        let id = queue
            .enqueue(EnqueueRequest::new("default", "x", serde_json::json!({})).with_max_attempts(5))
            .await
            .unwrap();
        queue.claim("w1", &[], 1, Duration::from_secs(60)).await.unwrap();

        let job = queue.fail(id, "w1", FailureOutcome::Terminal("no retry".into())).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }
}
