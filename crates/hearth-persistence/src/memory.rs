//! An in-process [`Store`] implementation backed by `std::sync::Mutex`-
//! guarded maps. Used by tests and by `hearth-testing`'s fixtures; the
//! production backend is `hearth-job-postgres`.
//!
//! Every method takes the lock, does its work synchronously, and drops
//! the guard before returning — there is never an `.await` while the
//! lock is held, so a single `Mutex` is sufficient and there is no
//! deadlock risk from nested acquisition.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_core::{
    HearthError, HearthResult, Job, JobStatus, OccurrenceKey, ScheduleDefinition, TaskInstance,
    TaskInstanceStatus, UpgradeAttempts,
};
use uuid::Uuid;

use crate::store::{JobFailureUpdate, QueueStats, Store};

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, Job>,
    idempotency_index: HashMap<(String, String), Uuid>,
    cancel_flags: HashSet<Uuid>,
    schedules: HashMap<Uuid, ScheduleDefinition>,
    task_instances: HashMap<Uuid, TaskInstance>,
    occurrence_index: HashMap<OccurrenceKey, Uuid>,
    upgrade_attempts: HashMap<Uuid, UpgradeAttempts>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("jobs", &self.jobs.len())
            .field("schedules", &self.schedules.len())
            .field("task_instances", &self.task_instances.len())
            .finish()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("in-memory store mutex poisoned")
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_job(&self, job: Job) -> HearthResult<Job> {
        let mut inner = self.lock();
        if let Some(key) = job.idempotency_key.clone() {
            let index_key = (job.queue.clone(), key);
            if let Some(existing_id) = inner.idempotency_index.get(&index_key) {
                if let Some(existing) = inner.jobs.get(existing_id) {
                    if !existing.is_terminal() {
                        return Ok(existing.clone());
                    }
                }
            }
            inner.idempotency_index.insert(index_key, job.id);
        }
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> HearthResult<Option<Job>> {
        Ok(self.lock().jobs.get(&id).cloned())
    }

    async fn claim_ready(
        &self,
        worker_id: &str,
        queues: &[String],
        limit: usize,
        lease_ttl: Duration,
        now: DateTime<Utc>,
    ) -> HearthResult<Vec<Job>> {
        let mut inner = self.lock();
        let mut ready: Vec<Uuid> = inner
            .jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Pending
                    && j.scheduled_for <= now
                    && (queues.is_empty() || queues.iter().any(|q| q == &j.queue))
            })
            .map(|j| j.id)
            .collect();

        ready.sort_by(|a, b| {
            let ja = &inner.jobs[a];
            let jb = &inner.jobs[b];
            jb.priority
                .cmp(&ja.priority)
                .then(ja.scheduled_for.cmp(&jb.scheduled_for))
                .then(ja.created_at.cmp(&jb.created_at))
        });

        let lease_expires_at = now + chrono::Duration::from_std(lease_ttl).unwrap_or_default();
        let mut claimed = Vec::new();
        for id in ready.into_iter().take(limit) {
            if let Some(job) = inner.jobs.get_mut(&id) {
                job.status = JobStatus::Running;
                job.worker_id = Some(worker_id.to_string());
                job.lease_expires_at = Some(lease_expires_at);
                job.started_at.get_or_insert(now);
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    async fn extend_lease(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease_ttl: Duration,
        now: DateTime<Utc>,
    ) -> HearthResult<()> {
        let mut inner = self.lock();
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| HearthError::NotFound(job_id.to_string()))?;
        if job.status != JobStatus::Running || job.worker_id.as_deref() != Some(worker_id) {
            return Err(HearthError::NotLeaseHolder);
        }
        job.lease_expires_at = Some(now + chrono::Duration::from_std(lease_ttl).unwrap_or_default());
        Ok(())
    }

    async fn complete_job(&self, job_id: Uuid, worker_id: &str, now: DateTime<Utc>) -> HearthResult<Job> {
        let mut inner = self.lock();
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| HearthError::NotFound(job_id.to_string()))?;
        if job.worker_id.as_deref() != Some(worker_id) {
            return Err(HearthError::NotLeaseHolder);
        }
        job.status = JobStatus::Completed;
        job.completed_at = Some(now);
        job.lease_expires_at = None;
        let result = job.clone();
        inner.cancel_flags.remove(&job_id);
        Ok(result)
    }

    async fn fail_running_job(
        &self,
        job_id: Uuid,
        worker_id: &str,
        update: JobFailureUpdate,
    ) -> HearthResult<Job> {
        let mut inner = self.lock();
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| HearthError::NotFound(job_id.to_string()))?;
        if job.worker_id.as_deref() != Some(worker_id) {
            return Err(HearthError::NotLeaseHolder);
        }
        job.status = update.new_status;
        job.attempts = update.attempts;
        job.scheduled_for = update.scheduled_for;
        job.last_error = Some(update.last_error);
        job.worker_id = None;
        job.lease_expires_at = None;
        if job.status == JobStatus::Failed {
            job.completed_at = None;
        }
        let result = job.clone();
        inner.cancel_flags.remove(&job_id);
        Ok(result)
    }

    async fn cancel_job(&self, job_id: Uuid, _now: DateTime<Utc>) -> HearthResult<Job> {
        let mut inner = self.lock();
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| HearthError::NotFound(job_id.to_string()))?;
        match job.status {
            JobStatus::Pending | JobStatus::Scheduled => {
                job.status = JobStatus::Cancelled;
                job.lease_expires_at = None;
            }
            JobStatus::Running => {
                inner.cancel_flags.insert(job_id);
            }
            _ => {}
        }
        Ok(inner.jobs.get(&job_id).expect("job present").clone())
    }

    async fn cancel_requested(&self, job_id: Uuid) -> HearthResult<bool> {
        Ok(self.lock().cancel_flags.contains(&job_id))
    }

    async fn list_expired_leases(&self, now: DateTime<Utc>) -> HearthResult<Vec<Job>> {
        Ok(self
            .lock()
            .jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Running
                    && j.lease_expires_at.map(|t| t < now).unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn list_jobs_by_status(&self, status: JobStatus) -> HearthResult<Vec<Job>> {
        Ok(self
            .lock()
            .jobs
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect())
    }

    async fn prune_terminal_jobs(&self, older_than: DateTime<Utc>) -> HearthResult<u64> {
        let mut inner = self.lock();
        let to_remove: Vec<Uuid> = inner
            .jobs
            .values()
            .filter(|j| {
                j.is_terminal()
                    && j.completed_at.map(|t| t < older_than).unwrap_or_else(|| j.created_at < older_than)
            })
            .map(|j| j.id)
            .collect();
        for id in &to_remove {
            inner.jobs.remove(id);
        }
        Ok(to_remove.len() as u64)
    }

    async fn queue_stats(&self) -> HearthResult<QueueStats> {
        let inner = self.lock();
        let mut stats = QueueStats::default();
        for job in inner.jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
                JobStatus::Scheduled => stats.scheduled += 1,
            }
        }
        Ok(stats)
    }

    async fn insert_schedule(&self, schedule: ScheduleDefinition) -> HearthResult<ScheduleDefinition> {
        let mut inner = self.lock();
        inner.schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    async fn get_schedule(&self, id: Uuid) -> HearthResult<Option<ScheduleDefinition>> {
        Ok(self.lock().schedules.get(&id).cloned())
    }

    async fn update_schedule(&self, schedule: ScheduleDefinition) -> HearthResult<()> {
        let mut inner = self.lock();
        if !inner.schedules.contains_key(&schedule.id) {
            return Err(HearthError::NotFound(schedule.id.to_string()));
        }
        inner.schedules.insert(schedule.id, schedule);
        Ok(())
    }

    async fn list_active_schedules(&self) -> HearthResult<Vec<ScheduleDefinition>> {
        Ok(self
            .lock()
            .schedules
            .values()
            .filter(|s| s.active)
            .cloned()
            .collect())
    }

    async fn deactivate_schedule(&self, id: Uuid) -> HearthResult<()> {
        let mut inner = self.lock();
        let schedule = inner
            .schedules
            .get_mut(&id)
            .ok_or_else(|| HearthError::NotFound(id.to_string()))?;
        schedule.active = false;
        Ok(())
    }

    async fn insert_task_instance(&self, instance: TaskInstance) -> HearthResult<TaskInstance> {
        let mut inner = self.lock();
        if let Some(key) = instance.occurrence_key {
            if let Some(existing_id) = inner.occurrence_index.get(&key) {
                if let Some(existing) = inner.task_instances.get(existing_id) {
                    return Ok(existing.clone());
                }
            }
            inner.occurrence_index.insert(key, instance.id);
        }
        inner.task_instances.insert(instance.id, instance.clone());
        Ok(instance)
    }

    async fn get_task_instance_by_occurrence(
        &self,
        key: OccurrenceKey,
    ) -> HearthResult<Option<TaskInstance>> {
        let inner = self.lock();
        Ok(inner
            .occurrence_index
            .get(&key)
            .and_then(|id| inner.task_instances.get(id))
            .cloned())
    }

    async fn list_task_instances_for_schedule(&self, schedule_id: Uuid) -> HearthResult<Vec<TaskInstance>> {
        Ok(self
            .lock()
            .task_instances
            .values()
            .filter(|t| t.schedule_id == Some(schedule_id))
            .cloned()
            .collect())
    }

    async fn update_task_instance_status(
        &self,
        id: Uuid,
        status: TaskInstanceStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> HearthResult<()> {
        let mut inner = self.lock();
        let instance = inner
            .task_instances
            .get_mut(&id)
            .ok_or_else(|| HearthError::NotFound(id.to_string()))?;
        instance.status = status;
        instance.completed_at = completed_at;
        Ok(())
    }

    async fn get_upgrade_attempts(&self, user_id: Uuid) -> HearthResult<UpgradeAttempts> {
        Ok(self
            .lock()
            .upgrade_attempts
            .get(&user_id)
            .cloned()
            .unwrap_or(UpgradeAttempts { user_id, attempts: Vec::new() }))
    }

    async fn save_upgrade_attempts(&self, attempts: UpgradeAttempts) -> HearthResult<()> {
        self.lock().upgrade_attempts.insert(attempts.user_id, attempts);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::JobStatus;

    fn job(queue: &str, idempotency_key: Option<&str>) -> Job {
        Job {
            id: Uuid::new_v4(),
            queue: queue.to_string(),
            job_type: "noop".into(),
            payload: serde_json::json!({}),
            priority: 0,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: 3,
            scheduled_for: Utc::now(),
            lease_expires_at: None,
            worker_id: None,
            last_error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            idempotency_key: idempotency_key.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn idempotent_insert_returns_existing_job() {
        let store = InMemoryStore::new();
        let j1 = job("default", Some("k"));
        let inserted = store.insert_job(j1.clone()).await.unwrap();
        assert_eq!(inserted.id, j1.id);

        let j2 = job("default", Some("k"));
        let second = store.insert_job(j2).await.unwrap();
        assert_eq!(second.id, j1.id, "second insert should return the first job's id");
    }

    #[tokio::test]
    async fn claim_respects_priority_and_time_order() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let mut low = job("default", None);
        low.priority = 0;
        low.scheduled_for = now;
        let mut high = job("default", None);
        high.priority = 10;
        high.scheduled_for = now;
        store.insert_job(low.clone()).await.unwrap();
        store.insert_job(high.clone()).await.unwrap();

        let claimed = store
            .claim_ready(
                "worker-a",
                &["default".to_string()],
                10,
                Duration::from_secs(60),
                now + chrono::Duration::seconds(1),
            )
            .await
            .unwrap();

        assert_eq!(claimed.len(), 2);
        assert_eq!(claimed[0].id, high.id, "higher priority job should claim first");
    }

    #[tokio::test]
    async fn non_lease_holder_cannot_complete() {
        let store = InMemoryStore::new();
        let j = job("default", None);
        store.insert_job(j.clone()).await.unwrap();
        store
            .claim_ready("worker-a", &[], 10, Duration::from_secs(60), Utc::now())
            .await
            .unwrap();

        let result = store.complete_job(j.id, "worker-b", Utc::now()).await;
        assert!(matches!(result, Err(HearthError::NotLeaseHolder)));
    }

    #[tokio::test]
    async fn cancel_running_job_sets_flag_not_status() {
        let store = InMemoryStore::new();
        let j = job("default", None);
        store.insert_job(j.clone()).await.unwrap();
        store
            .claim_ready("worker-a", &[], 10, Duration::from_secs(60), Utc::now())
            .await
            .unwrap();

        let cancelled = store.cancel_job(j.id, Utc::now()).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Running);
        assert!(store.cancel_requested(j.id).await.unwrap());
    }

    #[tokio::test]
    async fn occurrence_key_insert_is_idempotent() {
        let store = InMemoryStore::new();
        let schedule_id = Uuid::new_v4();
        let due = chrono::Utc::now().date_naive();
        let key = OccurrenceKey { schedule_id, due_date: due };

        let make = || TaskInstance {
            id: Uuid::new_v4(),
            schedule_id: Some(schedule_id),
            family_id: Uuid::new_v4(),
            assignee: None,
            title: "trash day".into(),
            status: TaskInstanceStatus::Pending,
            due_date: due,
            completed_at: None,
            occurrence_key: Some(key),
        };

        let first = store.insert_task_instance(make()).await.unwrap();
        let second = store.insert_task_instance(make()).await.unwrap();
        assert_eq!(first.id, second.id);
    }
}
