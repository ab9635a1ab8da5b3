//! Shared data model: [`Job`], [`ScheduleDefinition`], [`TaskInstance`],
//! [`Session`], and [`UpgradeAttempts`] — the entities every core crate
//! reads and writes through the `Store` trait (defined in
//! `hearth-persistence`, which depends on this crate, not the other way
//! around).

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Scheduled,
}

/// A unit of deferred work. See spec §3 for the full invariant list; the
/// short version: at most one `running` lease at a time, `attempts` never
/// exceeds `max_attempts`, and `idempotency_key` is unique among
/// non-terminal jobs in its queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub queue: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub scheduled_for: DateTime<Utc>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub idempotency_key: Option<String>,
}

impl Job {
    /// True once the job can never transition again without operator
    /// intervention.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

// ---------------------------------------------------------------------
// ScheduleDefinition
// ---------------------------------------------------------------------

/// One of the four recurrence shapes named in spec §3, plus raw cron.
/// Weekdays are `0..=6` for Monday..Sunday (avoids relying on
/// `chrono::Weekday`'s serde support, which isn't part of its public
/// contract).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recurrence {
    Daily,
    Weekly { weekdays: BTreeSet<u8> },
    MonthlyDay { day_of_month: u32 },
    MonthlyNthWeekday { nth: u8, weekday: u8 },
    Interval { seconds: i64 },
    Cron { expression: String },
}

/// A recurring task template, materialised into [`TaskInstance`]s by the
/// recurrence engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    pub id: Uuid,
    pub family_id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub task_type: String,
    pub default_priority: i32,
    pub default_assignee: Option<Uuid>,
    pub recurrence: Recurrence,
    /// IANA zone name (e.g. `"America/Chicago"`). All recurrence
    /// evaluation happens in this zone.
    pub timezone: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    /// How far ahead to materialise. Default 14.
    pub horizon_days: i64,
    pub active: bool,
}

impl ScheduleDefinition {
    pub const DEFAULT_HORIZON_DAYS: i64 = 14;
}

// ---------------------------------------------------------------------
// TaskInstance
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskInstanceStatus {
    Pending,
    Completed,
    Skipped,
    Cancelled,
}

/// `(schedule_id, due_date)` — the uniqueness anchor for exactly-once
/// materialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OccurrenceKey {
    pub schedule_id: Uuid,
    pub due_date: NaiveDate,
}

/// A materialised occurrence of a schedule (or an ad-hoc, non-recurring
/// task — `schedule_id`/`occurrence_key` are `None` in that case).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: Uuid,
    pub schedule_id: Option<Uuid>,
    pub family_id: Uuid,
    pub assignee: Option<Uuid>,
    pub title: String,
    pub status: TaskInstanceStatus,
    pub due_date: NaiveDate,
    pub completed_at: Option<DateTime<Utc>>,
    pub occurrence_key: Option<OccurrenceKey>,
}

// ---------------------------------------------------------------------
// Session / roles
// ---------------------------------------------------------------------

/// The role a token was originally issued with. Only ever `User` or
/// `Admin` — `shared` mode is a *downgrade* of one of these, not a role
/// of its own, which is why it lives on [`Role`] and not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullRole {
    User,
    Admin,
}

/// The role currently used for authorisation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Shared,
    User,
    Admin,
}

impl From<FullRole> for Role {
    fn from(r: FullRole) -> Self {
        match r {
            FullRole::User => Role::User,
            FullRole::Admin => Role::Admin,
        }
    }
}

/// A pure projection of a signed token — the server holds no session
/// state beyond [`UpgradeAttempts`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: Uuid,
    pub family_id: Uuid,
    pub effective_role: Role,
    pub original_role: FullRole,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub not_before: DateTime<Utc>,
}

// ---------------------------------------------------------------------
// UpgradeAttempts
// ---------------------------------------------------------------------

/// Per-user sliding-window counter of `Upgrade` attempts that consulted
/// the password, used to enforce the rate limit in spec §4.8/§8.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpgradeAttempts {
    pub user_id: Uuid,
    /// Timestamps of attempts still inside the sliding window. Callers
    /// are responsible for pruning entries older than the window before
    /// counting (see `hearth-auth::rate_limit`).
    pub attempts: Vec<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_terminal_classification() {
        let mut job = sample_job();
        job.status = JobStatus::Pending;
        assert!(!job.is_terminal());
        job.status = JobStatus::Running;
        assert!(!job.is_terminal());
        for terminal in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            job.status = terminal;
            assert!(job.is_terminal());
        }
    }

    #[test]
    fn role_from_full_role() {
        assert_eq!(Role::from(FullRole::Admin), Role::Admin);
        assert_eq!(Role::from(FullRole::User), Role::User);
    }

    fn sample_job() -> Job {
        Job {
            id: Uuid::new_v4(),
            queue: "default".into(),
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
            idempotency_key: None,
        }
    }
}
