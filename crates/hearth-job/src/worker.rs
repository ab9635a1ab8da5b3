//! [`WorkerPool`]: a bounded set of concurrent executors polling leases
//! and invoking handlers under a cancellation context.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use hearth_core::Clock;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::WorkerPoolConfig;
use crate::queue::{FailureOutcome, JobQueue};
use crate::registry::{HandlerContext, HandlerOutcome, HandlerRegistry};

/// Point-in-time counters, snapshotted for admin/observability surfaces.
#[derive(Debug, Default)]
pub struct WorkerPoolMetrics {
    pub claimed: AtomicU64,
    pub completed: AtomicU64,
    pub retried: AtomicU64,
    pub failed: AtomicU64,
    pub faulted: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerPoolMetricsSnapshot {
    pub claimed: u64,
    pub completed: u64,
    pub retried: u64,
    pub failed: u64,
    pub faulted: u64,
}

impl WorkerPoolMetrics {
    fn snapshot(&self) -> WorkerPoolMetricsSnapshot {
        WorkerPoolMetricsSnapshot {
            claimed: self.claimed.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            faulted: self.faulted.load(Ordering::Relaxed),
        }
    }
}

pub struct WorkerPool {
    config: WorkerPoolConfig,
    queue: Arc<JobQueue>,
    registry: Arc<HandlerRegistry>,
    clock: Arc<dyn Clock>,
    metrics: Arc<WorkerPoolMetrics>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn new(
        config: WorkerPoolConfig,
        queue: Arc<JobQueue>,
        registry: Arc<HandlerRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            queue,
            registry,
            clock,
            metrics: Arc::new(WorkerPoolMetrics::default()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn metrics(&self) -> WorkerPoolMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Signal every worker loop to stop claiming new jobs. Call `join` (or
    /// await the returned handles) to wait out `shutdown_grace`.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Spawn `worker_count` worker loops, returning their join handles.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        (0..self.config.worker_count)
            .map(|i| {
                let worker_id = format!("worker-{i}-{}", uuid::Uuid::new_v4());
                let worker = Worker {
                    id: worker_id,
                    config: self.config.clone(),
                    queue: self.queue.clone(),
                    registry: self.registry.clone(),
                    clock: self.clock.clone(),
                    metrics: self.metrics.clone(),
                    shutdown: self.shutdown.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect()
    }
}

struct Worker {
    id: String,
    config: WorkerPoolConfig,
    queue: Arc<JobQueue>,
    registry: Arc<HandlerRegistry>,
    clock: Arc<dyn Clock>,
    metrics: Arc<WorkerPoolMetrics>,
    shutdown: CancellationToken,
}

impl Worker {
    async fn run(self) {
        info!(worker_id = %self.id, "worker starting");
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let claimed = match self.queue.claim(&self.id, &self.config.queues, self.config.claim_batch, self.config.lease_ttl).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "claim failed");
                    Vec::new()
                }
            };

            if claimed.is_empty() {
                let jitter = Duration::from_millis(fastrand::u64(0..250));
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval + jitter) => {}
                    _ = self.shutdown.cancelled() => break,
                }
                continue;
            }

            for job in claimed {
                self.metrics.claimed.fetch_add(1, Ordering::Relaxed);
                self.execute_one(job).await;
            }
        }
        info!(worker_id = %self.id, "worker stopped claiming, draining in-flight work");
    }

    async fn execute_one(&self, job: hearth_core::Job) {
        let Some(registration) = self.registry.get(&job.job_type).map(|r| (*r).clone()) else {
            warn!(job_id = %job.id, job_type = %job.job_type, "unknown job type, failing terminally");
            let _ = self
                .queue
                .fail(job.id, &self.id, FailureOutcome::Terminal(format!("unknown job type {}", job.job_type)))
                .await;
            self.metrics.failed.fetch_add(1, Ordering::Relaxed);
            return;
        };

        // `claim_ready` granted a lease sized by the pool's default
        // (`config.lease_ttl`), since the store doesn't know a job's type
        // until after it's claimed. Re-lease immediately to the handler's
        // own registered `lease_ttl` so every downstream deadline/heartbeat
        // calculation uses the per-type value, not the pool default.
        let lease_ttl = registration.lease_ttl;
        let now = self.clock.now();
        if self.queue.heartbeat(job.id, &self.id, lease_ttl).await.is_err() {
            debug!(job_id = %job.id, "lease lost before handler could start");
            return;
        }
        let lease_expires_at = now + chrono::Duration::from_std(lease_ttl).unwrap_or_default();

        let cancel = CancellationToken::new();
        let done = Arc::new(Notify::new());
        // Set only by the heartbeat loop observing an explicit `Cancel()`
        // call, never by the deadline timer - distinguishes "the caller
        // asked us to stop" (terminal, not retried) from "we ran out of
        // lease time" (retryable, same as any other failure).
        let explicitly_cancelled = Arc::new(AtomicBool::new(false));

        let deadline_handle = {
            let deadline = lease_expires_at - chrono::Duration::from_std(self.config.safety_margin).unwrap_or_default();
            let wait = (deadline - now).to_std().unwrap_or(Duration::ZERO);
            let cancel = cancel.clone();
            let done = done.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => cancel.cancel(),
                    _ = done.notified() => {}
                }
            })
        };

        let heartbeat_handle = {
            let queue = self.queue.clone();
            let worker_id = self.id.clone();
            let job_id = job.id;
            let cancel = cancel.clone();
            let done = done.clone();
            let explicitly_cancelled = explicitly_cancelled.clone();
            tokio::spawn(async move {
                let interval = lease_ttl / 3;
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = cancel.cancelled() => break,
                        _ = done.notified() => break,
                    }
                    match queue.cancel_requested(job_id).await {
                        Ok(true) => {
                            explicitly_cancelled.store(true, Ordering::SeqCst);
                            cancel.cancel();
                            break;
                        }
                        Ok(false) => {}
                        Err(_) => break,
                    }
                    if queue.heartbeat(job_id, &worker_id, lease_ttl).await.is_err() {
                        break;
                    }
                }
            })
        };

        let ctx = HandlerContext::new(job.id, job.attempts + 1, cancel.clone());
        let handler = registration.handler.clone();
        let payload = job.payload.clone();

        let outcome = AssertUnwindSafe(handler.handle(ctx, payload))
            .catch_unwind()
            .await;

        done.notify_one();
        let _ = heartbeat_handle.await;
        let _ = deadline_handle.await;

        match outcome {
            Ok(HandlerOutcome::Ok) => {
                if let Err(e) = self.queue.complete(job.id, &self.id).await {
                    debug!(job_id = %job.id, error = %e, "complete failed (lease likely lost)");
                } else {
                    self.metrics.completed.fetch_add(1, Ordering::Relaxed);
                }
            }
            Ok(HandlerOutcome::Retry(reason)) => {
                let outcome = if explicitly_cancelled.load(Ordering::SeqCst) {
                    FailureOutcome::Terminal("cancelled".to_string())
                } else {
                    FailureOutcome::Retryable(reason)
                };
                match self.queue.fail(job.id, &self.id, outcome).await {
                    Ok(j) if j.status == hearth_core::JobStatus::Failed => {
                        self.metrics.failed.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(_) => {
                        self.metrics.retried.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => debug!(job_id = %job.id, error = %e, "fail call rejected"),
                }
            }
            Ok(HandlerOutcome::Terminal(reason)) => {
                if self.queue.fail(job.id, &self.id, FailureOutcome::Terminal(reason)).await.is_ok() {
                    self.metrics.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(panic) => {
                let message = panic_message(&panic);
                warn!(job_id = %job.id, message = %message, "handler panicked, treating as retryable");
                self.metrics.faulted.fetch_add(1, Ordering::Relaxed);
                let _ = self.queue.fail(job.id, &self.id, FailureOutcome::Retryable(message)).await;
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BackoffPolicy, EnqueueRequest, JobQueue};
    use async_trait::async_trait;
    use hearth_core::{JobStatus, SystemClock};
    use hearth_persistence::InMemoryStore;
    use std::sync::atomic::AtomicU32;
    use tokio::time::timeout;

    struct FlakyTwice {
        calls: AtomicU32,
    }

    #[async_trait]
    impl crate::Handler for FlakyTwice {
        async fn handle(&self, _ctx: HandlerContext, _payload: serde_json::Value) -> HandlerOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call < 3 {
                HandlerOutcome::Retry(format!("flaky #{call}"))
            } else {
                HandlerOutcome::Ok
            }
        }
    }

    async fn wait_for_status(queue: &JobQueue, id: uuid::Uuid, status: JobStatus) {
        timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(Some(job)) = queue.get_job(id).await {
                    if job.status == status {
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition was never satisfied");
    }

    #[tokio::test]
    async fn retries_with_backoff_then_completes() {
        let store: Arc<dyn hearth_persistence::Store> = Arc::new(InMemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

        let mut registry = HandlerRegistry::new();
        registry.register(
            "flaky",
            Arc::new(FlakyTwice { calls: AtomicU32::new(0) }),
            3,
            Duration::from_secs(5),
            BackoffPolicy::new(Duration::from_millis(20), Duration::from_millis(100)),
        );
        let registry = Arc::new(registry);

        let queue = Arc::new(JobQueue::new(store, clock.clone(), registry.clone()));
        let id = queue
            .enqueue(EnqueueRequest::new("default", "flaky", serde_json::json!({})).with_max_attempts(3))
            .await
            .unwrap();

        let pool = WorkerPool::new(
            WorkerPoolConfig { worker_count: 1, poll_interval: Duration::from_millis(10), ..Default::default() },
            queue.clone(),
            registry,
            clock,
        );
        let handles = pool.spawn();

        wait_for_status(&queue, id, JobStatus::Completed).await;

        let job = queue.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempts, 3);

        pool.shutdown();
        for handle in handles {
            let _ = handle.await;
        }
    }

    struct HangsUntilCancelled;

    #[async_trait]
    impl crate::Handler for HangsUntilCancelled {
        async fn handle(&self, ctx: HandlerContext, _payload: serde_json::Value) -> HandlerOutcome {
            ctx.cancelled_owned().await;
            HandlerOutcome::Retry("interrupted".to_string())
        }
    }

    #[tokio::test]
    async fn explicit_cancel_is_terminal_not_retried() {
        let store: Arc<dyn hearth_persistence::Store> = Arc::new(InMemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

        let mut registry = HandlerRegistry::new();
        registry.register(
            "long_running",
            Arc::new(HangsUntilCancelled),
            3,
            Duration::from_millis(300),
            BackoffPolicy::default(),
        );
        let registry = Arc::new(registry);

        let queue = Arc::new(JobQueue::new(store, clock.clone(), registry.clone()));
        let id = queue
            .enqueue(EnqueueRequest::new("default", "long_running", serde_json::json!({})))
            .await
            .unwrap();

        let pool = WorkerPool::new(
            WorkerPoolConfig { worker_count: 1, poll_interval: Duration::from_millis(10), ..Default::default() },
            queue.clone(),
            registry,
            clock,
        );
        let handles = pool.spawn();

        wait_for_status(&queue, id, JobStatus::Running).await;

        queue.cancel(id).await.unwrap();

        wait_for_status(&queue, id, JobStatus::Failed).await;

        let job = queue.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.last_error.as_deref(), Some("cancelled"));

        pool.shutdown();
        for handle in handles {
            let _ = handle.await;
        }
    }
}
