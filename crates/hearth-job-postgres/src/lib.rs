//! PostgreSQL implementation of the Hearth [`Store`] trait.
//!
//! # Database Schema
//!
//! ```sql
//! CREATE TABLE jobs (
//!     id UUID PRIMARY KEY,
//!     queue TEXT NOT NULL,
//!     job_type TEXT NOT NULL,
//!     payload JSONB NOT NULL,
//!     priority INTEGER NOT NULL DEFAULT 0,
//!     status TEXT NOT NULL DEFAULT 'pending',
//!     attempts INTEGER NOT NULL DEFAULT 0,
//!     max_attempts INTEGER NOT NULL DEFAULT 3,
//!     scheduled_for TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     lease_expires_at TIMESTAMPTZ,
//!     worker_id TEXT,
//!     last_error TEXT,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     started_at TIMESTAMPTZ,
//!     completed_at TIMESTAMPTZ,
//!     idempotency_key TEXT,
//!     cancel_requested BOOLEAN NOT NULL DEFAULT FALSE
//! );
//!
//! CREATE UNIQUE INDEX idx_jobs_idempotency ON jobs (queue, idempotency_key)
//!     WHERE idempotency_key IS NOT NULL AND status NOT IN ('completed', 'failed', 'cancelled');
//! CREATE INDEX idx_jobs_ready ON jobs (priority DESC, scheduled_for ASC, created_at ASC)
//!     WHERE status = 'pending';
//! CREATE INDEX idx_jobs_lease ON jobs (lease_expires_at)
//!     WHERE status = 'running';
//!
//! CREATE TABLE schedule_definitions (
//!     id UUID PRIMARY KEY,
//!     family_id UUID NOT NULL,
//!     owner_id UUID NOT NULL,
//!     title TEXT NOT NULL,
//!     description TEXT,
//!     task_type TEXT NOT NULL,
//!     default_priority INTEGER NOT NULL DEFAULT 0,
//!     default_assignee UUID,
//!     recurrence JSONB NOT NULL,
//!     timezone TEXT NOT NULL,
//!     start_date DATE NOT NULL,
//!     end_date DATE,
//!     horizon_days BIGINT NOT NULL DEFAULT 14,
//!     active BOOLEAN NOT NULL DEFAULT TRUE
//! );
//!
//! CREATE TABLE task_instances (
//!     id UUID PRIMARY KEY,
//!     schedule_id UUID,
//!     family_id UUID NOT NULL,
//!     assignee UUID,
//!     title TEXT NOT NULL,
//!     status TEXT NOT NULL DEFAULT 'pending',
//!     due_date DATE NOT NULL,
//!     completed_at TIMESTAMPTZ
//! );
//! CREATE UNIQUE INDEX idx_task_instances_occurrence ON task_instances (schedule_id, due_date)
//!     WHERE schedule_id IS NOT NULL;
//!
//! CREATE TABLE upgrade_attempts (
//!     user_id UUID PRIMARY KEY,
//!     attempts JSONB NOT NULL DEFAULT '[]'
//! );
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_core::{
    HearthError, HearthResult, Job, JobStatus, OccurrenceKey, Recurrence, ScheduleDefinition,
    TaskInstance, TaskInstanceStatus, UpgradeAttempts,
};
use hearth_persistence::{JobFailureUpdate, QueueStats, Store};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// PostgreSQL-backed store.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn status_to_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Running => "running",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Cancelled => "cancelled",
        JobStatus::Scheduled => "scheduled",
    }
}

fn status_from_str(s: &str) -> HearthResult<JobStatus> {
    Ok(match s {
        "pending" => JobStatus::Pending,
        "running" => JobStatus::Running,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        "cancelled" => JobStatus::Cancelled,
        "scheduled" => JobStatus::Scheduled,
        other => return Err(HearthError::StorageUnavailable(format!("unknown job status {other}"))),
    })
}

fn task_status_to_str(status: TaskInstanceStatus) -> &'static str {
    match status {
        TaskInstanceStatus::Pending => "pending",
        TaskInstanceStatus::Completed => "completed",
        TaskInstanceStatus::Skipped => "skipped",
        TaskInstanceStatus::Cancelled => "cancelled",
    }
}

fn task_status_from_str(s: &str) -> HearthResult<TaskInstanceStatus> {
    Ok(match s {
        "pending" => TaskInstanceStatus::Pending,
        "completed" => TaskInstanceStatus::Completed,
        "skipped" => TaskInstanceStatus::Skipped,
        "cancelled" => TaskInstanceStatus::Cancelled,
        other => {
            return Err(HearthError::StorageUnavailable(format!(
                "unknown task instance status {other}"
            )))
        }
    })
}

fn job_from_row(row: &sqlx::postgres::PgRow) -> HearthResult<Job> {
    Ok(Job {
        id: row.try_get("id").map_err(pg_err)?,
        queue: row.try_get("queue").map_err(pg_err)?,
        job_type: row.try_get("job_type").map_err(pg_err)?,
        payload: row.try_get("payload").map_err(pg_err)?,
        priority: row.try_get("priority").map_err(pg_err)?,
        status: status_from_str(row.try_get::<String, _>("status").map_err(pg_err)?.as_str())?,
        attempts: row.try_get("attempts").map_err(pg_err)?,
        max_attempts: row.try_get("max_attempts").map_err(pg_err)?,
        scheduled_for: row.try_get("scheduled_for").map_err(pg_err)?,
        lease_expires_at: row.try_get("lease_expires_at").map_err(pg_err)?,
        worker_id: row.try_get("worker_id").map_err(pg_err)?,
        last_error: row.try_get("last_error").map_err(pg_err)?,
        created_at: row.try_get("created_at").map_err(pg_err)?,
        started_at: row.try_get("started_at").map_err(pg_err)?,
        completed_at: row.try_get("completed_at").map_err(pg_err)?,
        idempotency_key: row.try_get("idempotency_key").map_err(pg_err)?,
    })
}

fn pg_err(e: sqlx::Error) -> HearthError {
    HearthError::StorageUnavailable(e.to_string())
}

#[async_trait]
impl Store for PgStore {
    async fn insert_job(&self, job: Job) -> HearthResult<Job> {
        if let Some(key) = job.idempotency_key.as_ref() {
            let existing = sqlx::query(
                r#"
                SELECT id, queue, job_type, payload, priority, status, attempts, max_attempts,
                       scheduled_for, lease_expires_at, worker_id, last_error, created_at,
                       started_at, completed_at, idempotency_key
                FROM jobs
                WHERE queue = $1 AND idempotency_key = $2
                  AND status NOT IN ('completed', 'failed', 'cancelled')
                "#,
            )
            .bind(&job.queue)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(pg_err)?;

            if let Some(row) = existing {
                return job_from_row(&row);
            }
        }

        sqlx::query(
            r#"
            INSERT INTO jobs (id, queue, job_type, payload, priority, status, attempts,
                               max_attempts, scheduled_for, lease_expires_at, worker_id,
                               last_error, created_at, started_at, completed_at, idempotency_key)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(job.id)
        .bind(&job.queue)
        .bind(&job.job_type)
        .bind(&job.payload)
        .bind(job.priority)
        .bind(status_to_str(job.status))
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(job.scheduled_for)
        .bind(job.lease_expires_at)
        .bind(&job.worker_id)
        .bind(&job.last_error)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.idempotency_key)
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;

        tracing::debug!(job_id = %job.id, queue = %job.queue, job_type = %job.job_type, "inserted job");
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> HearthResult<Option<Job>> {
        let row = sqlx::query(
            r#"
            SELECT id, queue, job_type, payload, priority, status, attempts, max_attempts,
                   scheduled_for, lease_expires_at, worker_id, last_error, created_at,
                   started_at, completed_at, idempotency_key
            FROM jobs WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(pg_err)?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn claim_ready(
        &self,
        worker_id: &str,
        queues: &[String],
        limit: usize,
        lease_ttl: Duration,
        now: DateTime<Utc>,
    ) -> HearthResult<Vec<Job>> {
        let lease_expires_at = now + chrono::Duration::from_std(lease_ttl).unwrap_or_default();
        let queue_filter: Option<Vec<String>> = if queues.is_empty() {
            None
        } else {
            Some(queues.to_vec())
        };

        let rows = sqlx::query(
            r#"
            WITH claimable AS (
                SELECT id
                FROM jobs
                WHERE status = 'pending'
                  AND scheduled_for <= $1
                  AND ($2::text[] IS NULL OR queue = ANY($2))
                ORDER BY priority DESC, scheduled_for ASC, created_at ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET status = 'running',
                worker_id = $4,
                lease_expires_at = $5,
                started_at = COALESCE(started_at, $1)
            WHERE id IN (SELECT id FROM claimable)
            RETURNING id, queue, job_type, payload, priority, status, attempts, max_attempts,
                      scheduled_for, lease_expires_at, worker_id, last_error, created_at,
                      started_at, completed_at, idempotency_key
            "#,
        )
        .bind(now)
        .bind(queue_filter)
        .bind(limit as i64)
        .bind(worker_id)
        .bind(lease_expires_at)
        .fetch_all(&self.pool)
        .await
        .map_err(pg_err)?;

        rows.iter().map(job_from_row).collect()
    }

    async fn extend_lease(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease_ttl: Duration,
        now: DateTime<Utc>,
    ) -> HearthResult<()> {
        let lease_expires_at = now + chrono::Duration::from_std(lease_ttl).unwrap_or_default();
        let result = sqlx::query(
            r#"
            UPDATE jobs SET lease_expires_at = $1
            WHERE id = $2 AND worker_id = $3 AND status = 'running'
            "#,
        )
        .bind(lease_expires_at)
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;

        if result.rows_affected() == 0 {
            return Err(HearthError::NotLeaseHolder);
        }
        Ok(())
    }

    async fn complete_job(&self, job_id: Uuid, worker_id: &str, now: DateTime<Utc>) -> HearthResult<Job> {
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed', completed_at = $1, lease_expires_at = NULL, cancel_requested = FALSE
            WHERE id = $2 AND worker_id = $3
            RETURNING id, queue, job_type, payload, priority, status, attempts, max_attempts,
                      scheduled_for, lease_expires_at, worker_id, last_error, created_at,
                      started_at, completed_at, idempotency_key
            "#,
        )
        .bind(now)
        .bind(job_id)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(pg_err)?;

        match row {
            Some(row) => job_from_row(&row),
            None => Err(HearthError::NotLeaseHolder),
        }
    }

    async fn fail_running_job(
        &self,
        job_id: Uuid,
        worker_id: &str,
        update: JobFailureUpdate,
    ) -> HearthResult<Job> {
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $1, attempts = $2, scheduled_for = $3, last_error = $4,
                worker_id = NULL, lease_expires_at = NULL, cancel_requested = FALSE
            WHERE id = $5 AND worker_id = $6
            RETURNING id, queue, job_type, payload, priority, status, attempts, max_attempts,
                      scheduled_for, lease_expires_at, worker_id, last_error, created_at,
                      started_at, completed_at, idempotency_key
            "#,
        )
        .bind(status_to_str(update.new_status))
        .bind(update.attempts)
        .bind(update.scheduled_for)
        .bind(&update.last_error)
        .bind(job_id)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(pg_err)?;

        match row {
            Some(row) => job_from_row(&row),
            None => Err(HearthError::NotLeaseHolder),
        }
    }

    async fn cancel_job(&self, job_id: Uuid, _now: DateTime<Utc>) -> HearthResult<Job> {
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET status = CASE WHEN status IN ('pending', 'scheduled') THEN 'cancelled' ELSE status END,
                lease_expires_at = CASE WHEN status IN ('pending', 'scheduled') THEN NULL ELSE lease_expires_at END,
                cancel_requested = CASE WHEN status = 'running' THEN TRUE ELSE cancel_requested END
            WHERE id = $1
            RETURNING id, queue, job_type, payload, priority, status, attempts, max_attempts,
                      scheduled_for, lease_expires_at, worker_id, last_error, created_at,
                      started_at, completed_at, idempotency_key
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(pg_err)?;

        match row {
            Some(row) => job_from_row(&row),
            None => Err(HearthError::NotFound(job_id.to_string())),
        }
    }

    async fn cancel_requested(&self, job_id: Uuid) -> HearthResult<bool> {
        let row = sqlx::query("SELECT cancel_requested FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(pg_err)?;
        Ok(row.map(|r| r.get::<bool, _>("cancel_requested")).unwrap_or(false))
    }

    async fn list_expired_leases(&self, now: DateTime<Utc>) -> HearthResult<Vec<Job>> {
        let rows = sqlx::query(
            r#"
            SELECT id, queue, job_type, payload, priority, status, attempts, max_attempts,
                   scheduled_for, lease_expires_at, worker_id, last_error, created_at,
                   started_at, completed_at, idempotency_key
            FROM jobs WHERE status = 'running' AND lease_expires_at < $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(pg_err)?;

        rows.iter().map(job_from_row).collect()
    }

    async fn list_jobs_by_status(&self, status: JobStatus) -> HearthResult<Vec<Job>> {
        let rows = sqlx::query(
            r#"
            SELECT id, queue, job_type, payload, priority, status, attempts, max_attempts,
                   scheduled_for, lease_expires_at, worker_id, last_error, created_at,
                   started_at, completed_at, idempotency_key
            FROM jobs WHERE status = $1
            "#,
        )
        .bind(status_to_str(status))
        .fetch_all(&self.pool)
        .await
        .map_err(pg_err)?;

        rows.iter().map(job_from_row).collect()
    }

    async fn prune_terminal_jobs(&self, older_than: DateTime<Utc>) -> HearthResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status IN ('completed', 'failed', 'cancelled')
              AND COALESCE(completed_at, created_at) < $1
            "#,
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;

        Ok(result.rows_affected())
    }

    async fn queue_stats(&self) -> HearthResult<QueueStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'running') AS running,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled,
                COUNT(*) FILTER (WHERE status = 'scheduled') AS scheduled
            FROM jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(pg_err)?;

        Ok(QueueStats {
            pending: row.try_get::<i64, _>("pending").map_err(pg_err)? as u64,
            running: row.try_get::<i64, _>("running").map_err(pg_err)? as u64,
            completed: row.try_get::<i64, _>("completed").map_err(pg_err)? as u64,
            failed: row.try_get::<i64, _>("failed").map_err(pg_err)? as u64,
            cancelled: row.try_get::<i64, _>("cancelled").map_err(pg_err)? as u64,
            scheduled: row.try_get::<i64, _>("scheduled").map_err(pg_err)? as u64,
        })
    }

    async fn insert_schedule(&self, schedule: ScheduleDefinition) -> HearthResult<ScheduleDefinition> {
        let recurrence = serde_json::to_value(&schedule.recurrence)
            .map_err(|e| HearthError::Validation(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO schedule_definitions
                (id, family_id, owner_id, title, description, task_type, default_priority,
                 default_assignee, recurrence, timezone, start_date, end_date, horizon_days, active)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)
            "#,
        )
        .bind(schedule.id)
        .bind(schedule.family_id)
        .bind(schedule.owner_id)
        .bind(&schedule.title)
        .bind(&schedule.description)
        .bind(&schedule.task_type)
        .bind(schedule.default_priority)
        .bind(schedule.default_assignee)
        .bind(&recurrence)
        .bind(&schedule.timezone)
        .bind(schedule.start_date)
        .bind(schedule.end_date)
        .bind(schedule.horizon_days)
        .bind(schedule.active)
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;

        Ok(schedule)
    }

    async fn get_schedule(&self, id: Uuid) -> HearthResult<Option<ScheduleDefinition>> {
        let row = sqlx::query("SELECT * FROM schedule_definitions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(pg_err)?;

        row.as_ref().map(schedule_from_row).transpose()
    }

    async fn update_schedule(&self, schedule: ScheduleDefinition) -> HearthResult<()> {
        let recurrence = serde_json::to_value(&schedule.recurrence)
            .map_err(|e| HearthError::Validation(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE schedule_definitions
            SET family_id=$2, owner_id=$3, title=$4, description=$5, task_type=$6,
                default_priority=$7, default_assignee=$8, recurrence=$9, timezone=$10,
                start_date=$11, end_date=$12, horizon_days=$13, active=$14
            WHERE id=$1
            "#,
        )
        .bind(schedule.id)
        .bind(schedule.family_id)
        .bind(schedule.owner_id)
        .bind(&schedule.title)
        .bind(&schedule.description)
        .bind(&schedule.task_type)
        .bind(schedule.default_priority)
        .bind(schedule.default_assignee)
        .bind(&recurrence)
        .bind(&schedule.timezone)
        .bind(schedule.start_date)
        .bind(schedule.end_date)
        .bind(schedule.horizon_days)
        .bind(schedule.active)
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;

        Ok(())
    }

    async fn list_active_schedules(&self) -> HearthResult<Vec<ScheduleDefinition>> {
        let rows = sqlx::query("SELECT * FROM schedule_definitions WHERE active = TRUE")
            .fetch_all(&self.pool)
            .await
            .map_err(pg_err)?;

        rows.iter().map(schedule_from_row).collect()
    }

    async fn deactivate_schedule(&self, id: Uuid) -> HearthResult<()> {
        let result = sqlx::query("UPDATE schedule_definitions SET active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(pg_err)?;

        if result.rows_affected() == 0 {
            return Err(HearthError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn insert_task_instance(&self, instance: TaskInstance) -> HearthResult<TaskInstance> {
        if let Some(key) = instance.occurrence_key {
            let existing = sqlx::query("SELECT * FROM task_instances WHERE schedule_id = $1 AND due_date = $2")
                .bind(key.schedule_id)
                .bind(key.due_date)
                .fetch_optional(&self.pool)
                .await
                .map_err(pg_err)?;
            if let Some(row) = existing {
                return task_instance_from_row(&row);
            }
        }

        sqlx::query(
            r#"
            INSERT INTO task_instances (id, schedule_id, family_id, assignee, title, status, due_date, completed_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(instance.id)
        .bind(instance.schedule_id)
        .bind(instance.family_id)
        .bind(instance.assignee)
        .bind(&instance.title)
        .bind(task_status_to_str(instance.status))
        .bind(instance.due_date)
        .bind(instance.completed_at)
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;

        Ok(instance)
    }

    async fn get_task_instance_by_occurrence(&self, key: OccurrenceKey) -> HearthResult<Option<TaskInstance>> {
        let row = sqlx::query("SELECT * FROM task_instances WHERE schedule_id = $1 AND due_date = $2")
            .bind(key.schedule_id)
            .bind(key.due_date)
            .fetch_optional(&self.pool)
            .await
            .map_err(pg_err)?;

        row.as_ref().map(task_instance_from_row).transpose()
    }

    async fn list_task_instances_for_schedule(&self, schedule_id: Uuid) -> HearthResult<Vec<TaskInstance>> {
        let rows = sqlx::query("SELECT * FROM task_instances WHERE schedule_id = $1")
            .bind(schedule_id)
            .fetch_all(&self.pool)
            .await
            .map_err(pg_err)?;

        rows.iter().map(task_instance_from_row).collect()
    }

    async fn update_task_instance_status(
        &self,
        id: Uuid,
        status: TaskInstanceStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> HearthResult<()> {
        let result = sqlx::query("UPDATE task_instances SET status = $1, completed_at = $2 WHERE id = $3")
            .bind(task_status_to_str(status))
            .bind(completed_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(pg_err)?;

        if result.rows_affected() == 0 {
            return Err(HearthError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn get_upgrade_attempts(&self, user_id: Uuid) -> HearthResult<UpgradeAttempts> {
        let row = sqlx::query("SELECT attempts FROM upgrade_attempts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(pg_err)?;

        match row {
            Some(row) => {
                let attempts: serde_json::Value = row.try_get("attempts").map_err(pg_err)?;
                let attempts = serde_json::from_value(attempts)
                    .map_err(|e| HearthError::StorageUnavailable(e.to_string()))?;
                Ok(UpgradeAttempts { user_id, attempts })
            }
            None => Ok(UpgradeAttempts { user_id, attempts: Vec::new() }),
        }
    }

    async fn save_upgrade_attempts(&self, attempts: UpgradeAttempts) -> HearthResult<()> {
        let json = serde_json::to_value(&attempts.attempts)
            .map_err(|e| HearthError::Validation(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO upgrade_attempts (user_id, attempts) VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET attempts = EXCLUDED.attempts
            "#,
        )
        .bind(attempts.user_id)
        .bind(json)
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;

        Ok(())
    }
}

fn schedule_from_row(row: &sqlx::postgres::PgRow) -> HearthResult<ScheduleDefinition> {
    let recurrence_json: serde_json::Value = row.try_get("recurrence").map_err(pg_err)?;
    let recurrence: Recurrence =
        serde_json::from_value(recurrence_json).map_err(|e| HearthError::StorageUnavailable(e.to_string()))?;

    Ok(ScheduleDefinition {
        id: row.try_get("id").map_err(pg_err)?,
        family_id: row.try_get("family_id").map_err(pg_err)?,
        owner_id: row.try_get("owner_id").map_err(pg_err)?,
        title: row.try_get("title").map_err(pg_err)?,
        description: row.try_get("description").map_err(pg_err)?,
        task_type: row.try_get("task_type").map_err(pg_err)?,
        default_priority: row.try_get("default_priority").map_err(pg_err)?,
        default_assignee: row.try_get("default_assignee").map_err(pg_err)?,
        recurrence,
        timezone: row.try_get("timezone").map_err(pg_err)?,
        start_date: row.try_get("start_date").map_err(pg_err)?,
        end_date: row.try_get("end_date").map_err(pg_err)?,
        horizon_days: row.try_get("horizon_days").map_err(pg_err)?,
        active: row.try_get("active").map_err(pg_err)?,
    })
}

fn task_instance_from_row(row: &sqlx::postgres::PgRow) -> HearthResult<TaskInstance> {
    let schedule_id: Option<Uuid> = row.try_get("schedule_id").map_err(pg_err)?;
    let due_date = row.try_get("due_date").map_err(pg_err)?;
    Ok(TaskInstance {
        id: row.try_get("id").map_err(pg_err)?,
        schedule_id,
        family_id: row.try_get("family_id").map_err(pg_err)?,
        assignee: row.try_get("assignee").map_err(pg_err)?,
        title: row.try_get("title").map_err(pg_err)?,
        status: task_status_from_str(row.try_get::<String, _>("status").map_err(pg_err)?.as_str())?,
        due_date,
        completed_at: row.try_get("completed_at").map_err(pg_err)?,
        occurrence_key: schedule_id.map(|schedule_id| OccurrenceKey { schedule_id, due_date }),
    })
}
