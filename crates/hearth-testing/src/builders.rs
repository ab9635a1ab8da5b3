//! Builder helpers for constructing fixture data without spelling out
//! every field at every call site. Defaults aim for "the simplest job/
//! schedule that satisfies the type", not realistic production data.

use chrono::{NaiveDate, Utc};
use hearth_core::{Job, JobStatus, Recurrence, ScheduleDefinition, TaskInstance, TaskInstanceStatus};
use uuid::Uuid;

pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(job_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job: Job {
                id: Uuid::new_v4(),
                queue: "default".into(),
                job_type: job_type.into(),
                payload: serde_json::json!({}),
                priority: 0,
                status: JobStatus::Pending,
                attempts: 0,
                max_attempts: 3,
                scheduled_for: now,
                lease_expires_at: None,
                worker_id: None,
                last_error: None,
                created_at: now,
                started_at: None,
                completed_at: None,
                idempotency_key: None,
            },
        }
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.job.queue = queue.into();
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.job.payload = payload;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.job.priority = priority;
        self
    }

    pub fn max_attempts(mut self, max_attempts: i32) -> Self {
        self.job.max_attempts = max_attempts;
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.job.idempotency_key = Some(key.into());
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

pub struct ScheduleBuilder {
    schedule: ScheduleDefinition,
}

impl ScheduleBuilder {
    pub fn new(recurrence: Recurrence, start_date: NaiveDate) -> Self {
        Self {
            schedule: ScheduleDefinition {
                id: Uuid::new_v4(),
                family_id: Uuid::new_v4(),
                owner_id: Uuid::new_v4(),
                title: "Fixture chore".into(),
                description: None,
                task_type: "chore".into(),
                default_priority: 0,
                default_assignee: None,
                recurrence,
                timezone: "UTC".into(),
                start_date,
                end_date: None,
                horizon_days: ScheduleDefinition::DEFAULT_HORIZON_DAYS,
                active: true,
            },
        }
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.schedule.timezone = timezone.into();
        self
    }

    pub fn horizon_days(mut self, horizon_days: i64) -> Self {
        self.schedule.horizon_days = horizon_days;
        self
    }

    pub fn family(mut self, family_id: Uuid) -> Self {
        self.schedule.family_id = family_id;
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.schedule.active = active;
        self
    }

    pub fn build(self) -> ScheduleDefinition {
        self.schedule
    }
}

pub fn task_instance(schedule_id: Uuid, family_id: Uuid, due_date: NaiveDate) -> TaskInstance {
    TaskInstance {
        id: Uuid::new_v4(),
        schedule_id: Some(schedule_id),
        family_id,
        assignee: None,
        title: "Fixture instance".into(),
        status: TaskInstanceStatus::Pending,
        due_date,
        completed_at: None,
        occurrence_key: Some(hearth_core::OccurrenceKey { schedule_id, due_date }),
    }
}
