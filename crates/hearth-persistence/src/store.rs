//! The [`Store`] trait: transactional persistence for jobs, schedule
//! definitions, task instances, and upgrade-attempt counters.
//!
//! Every operation here is expected to execute as a single atomic
//! transaction against the backing database. A generic `WithTx(fn)`
//! combinator would let a caller wrap arbitrary logic in a transaction,
//! but it isn't object-safe; these discrete, already-transactional
//! methods are the object-safe equivalent, so the trait can be passed
//! around as `Arc<dyn Store>`.
//!
//! Implementations MUST uphold:
//! - at most one `running` lease per job at any wall time (`claim_ready`
//!   and `fail_running_job`/`complete_job` check `worker_id` ownership);
//! - `idempotency_key` uniqueness among non-terminal jobs in a queue
//!   (`insert_job` returns the existing job instead of erroring);
//! - `occurrence_key` uniqueness for task instances (`insert_task_instance`
//!   returns the existing instance instead of erroring).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_core::{HearthResult, Job, JobStatus, OccurrenceKey, ScheduleDefinition, TaskInstance, TaskInstanceStatus, UpgradeAttempts};
use std::time::Duration;
use uuid::Uuid;

/// Aggregate counts across every job status, used for admin visibility
/// into poisoned (`failed`) jobs and general queue health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub scheduled: u64,
}

/// The outcome the caller (the job queue's retry policy) has already
/// decided on for a failed job; the store just applies it atomically and
/// checks lease ownership.
#[derive(Debug, Clone)]
pub struct JobFailureUpdate {
    pub new_status: JobStatus,
    pub attempts: i32,
    pub scheduled_for: DateTime<Utc>,
    pub last_error: String,
}

#[async_trait]
pub trait Store: std::fmt::Debug + Send + Sync {
    // ---- Jobs ----

    /// Insert a new job. If `idempotency_key` is set and collides with a
    /// live (non-terminal) job in the same queue, returns the existing
    /// job instead of inserting — this is the idempotent-enqueue path,
    /// not an error.
    async fn insert_job(&self, job: Job) -> HearthResult<Job>;

    async fn get_job(&self, id: Uuid) -> HearthResult<Option<Job>>;

    /// Atomically transition up to `limit` ready jobs (`status=pending`,
    /// `scheduled_for <= now`, queue in `queues`) to `running`, ordered
    /// `priority DESC, scheduled_for ASC, created_at ASC`.
    async fn claim_ready(
        &self,
        worker_id: &str,
        queues: &[String],
        limit: usize,
        lease_ttl: Duration,
        now: DateTime<Utc>,
    ) -> HearthResult<Vec<Job>>;

    /// Extend a held lease. Fails with `NotLeaseHolder` if `worker_id`
    /// does not match the job's current holder, or if the job is not
    /// `running`.
    async fn extend_lease(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease_ttl: Duration,
        now: DateTime<Utc>,
    ) -> HearthResult<()>;

    /// Transition `running` -> `completed`. Fails with `NotLeaseHolder`
    /// on worker mismatch.
    async fn complete_job(&self, job_id: Uuid, worker_id: &str, now: DateTime<Utc>) -> HearthResult<Job>;

    /// Apply a caller-computed failure outcome (retry-with-backoff or
    /// terminal) atomically, clearing the lease. Fails with
    /// `NotLeaseHolder` on worker mismatch.
    async fn fail_running_job(
        &self,
        job_id: Uuid,
        worker_id: &str,
        update: JobFailureUpdate,
    ) -> HearthResult<Job>;

    /// Cancel a job. `pending`/`scheduled` jobs move to `cancelled`
    /// immediately; `running` jobs are left `running` with a cancellation
    /// flag the next heartbeat call observes (see `cancel_requested`).
    async fn cancel_job(&self, job_id: Uuid, now: DateTime<Utc>) -> HearthResult<Job>;

    /// Whether `Cancel` has been requested for a still-running job.
    async fn cancel_requested(&self, job_id: Uuid) -> HearthResult<bool>;

    /// Jobs whose lease has expired while still `running`.
    async fn list_expired_leases(&self, now: DateTime<Utc>) -> HearthResult<Vec<Job>>;

    async fn list_jobs_by_status(&self, status: JobStatus) -> HearthResult<Vec<Job>>;

    /// Delete terminal (`completed`/`failed`/`cancelled`) jobs older than
    /// `older_than`. Returns the number removed.
    async fn prune_terminal_jobs(&self, older_than: DateTime<Utc>) -> HearthResult<u64>;

    async fn queue_stats(&self) -> HearthResult<QueueStats>;

    // ---- ScheduleDefinitions ----

    async fn insert_schedule(&self, schedule: ScheduleDefinition) -> HearthResult<ScheduleDefinition>;

    async fn get_schedule(&self, id: Uuid) -> HearthResult<Option<ScheduleDefinition>>;

    async fn update_schedule(&self, schedule: ScheduleDefinition) -> HearthResult<()>;

    async fn list_active_schedules(&self) -> HearthResult<Vec<ScheduleDefinition>>;

    /// Sets `active=false`. Materialised instances are untouched.
    async fn deactivate_schedule(&self, id: Uuid) -> HearthResult<()>;

    // ---- TaskInstances ----

    /// Insert a materialised occurrence. On `occurrence_key` conflict,
    /// returns the existing instance — this is the exactly-once
    /// materialisation guarantee, not an error.
    async fn insert_task_instance(&self, instance: TaskInstance) -> HearthResult<TaskInstance>;

    async fn get_task_instance_by_occurrence(
        &self,
        key: OccurrenceKey,
    ) -> HearthResult<Option<TaskInstance>>;

    async fn list_task_instances_for_schedule(&self, schedule_id: Uuid) -> HearthResult<Vec<TaskInstance>>;

    async fn update_task_instance_status(
        &self,
        id: Uuid,
        status: TaskInstanceStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> HearthResult<()>;

    // ---- UpgradeAttempts ----

    async fn get_upgrade_attempts(&self, user_id: Uuid) -> HearthResult<UpgradeAttempts>;

    async fn save_upgrade_attempts(&self, attempts: UpgradeAttempts) -> HearthResult<()>;
}
