//! [`RecurrenceEngine`]: the `recurrence.expand` handler. Loads a
//! schedule, enumerates occurrences in its timezone over the
//! `[today, today+horizon_days]` window, materialises `TaskInstance`s
//! idempotently, and re-enqueues itself.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use chrono_tz::Tz;
use hearth_core::{Clock, HearthError, TaskInstance, TaskInstanceStatus};
use hearth_job::{EnqueueRequest, Handler, HandlerContext, HandlerOutcome, JobQueue};
use hearth_persistence::Store;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::occurrences::enumerate;

#[derive(Debug, Clone, Copy)]
pub struct RecurrenceConfig {
    pub rewind_days: i64,
    /// Spacing between continuation enqueues, used to bucket the
    /// continuation's idempotency key so rapid re-expansion requests
    /// collapse the same way the Scheduler's tick bucket does.
    pub continuation_interval_secs: i64,
}

impl Default for RecurrenceConfig {
    fn default() -> Self {
        Self { rewind_days: 0, continuation_interval_secs: 30 }
    }
}

impl RecurrenceConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            rewind_days: std::env::var("HEARTH_REWIND_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.rewind_days),
            continuation_interval_secs: std::env::var("HEARTH_RECURRENCE_CONTINUATION_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.continuation_interval_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExpandPayload {
    schedule_id: Uuid,
}

pub struct RecurrenceEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    queue: Arc<JobQueue>,
    config: RecurrenceConfig,
}

impl RecurrenceEngine {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, queue: Arc<JobQueue>, config: RecurrenceConfig) -> Self {
        Self { store, clock, queue, config }
    }

    /// Expand one schedule. Returns the number of instances newly
    /// materialised (pre-existing occurrence keys don't count).
    pub async fn expand(&self, schedule_id: Uuid) -> Result<usize, HearthError> {
        let schedule = self
            .store
            .get_schedule(schedule_id)
            .await?
            .ok_or_else(|| HearthError::NotFound(schedule_id.to_string()))?;

        if !schedule.active {
            debug!(%schedule_id, "schedule inactive, skipping expansion");
            return Ok(0);
        }

        let tz: Tz = Tz::from_str(&schedule.timezone)
            .map_err(|_| HearthError::Validation(format!("invalid timezone {}", schedule.timezone)))?;
        let today = self.clock.now().with_timezone(&tz).date_naive();

        let window_start = window_floor(schedule.start_date, today, self.config.rewind_days);
        let mut window_end = today + chrono::Duration::days(schedule.horizon_days);
        if let Some(end_date) = schedule.end_date {
            window_end = window_end.min(end_date);
        }

        let occurrences = enumerate(&schedule.recurrence, &schedule.timezone, schedule.start_date, window_start, window_end)
            .map_err(|e| HearthError::Validation(e.to_string()))?;

        let mut created = 0usize;
        for due_date in occurrences {
            let key = hearth_core::OccurrenceKey { schedule_id: schedule.id, due_date };
            if self.store.get_task_instance_by_occurrence(key).await?.is_some() {
                continue;
            }

            let instance = TaskInstance {
                id: Uuid::new_v4(),
                schedule_id: Some(schedule.id),
                family_id: schedule.family_id,
                assignee: schedule.default_assignee,
                title: schedule.title.clone(),
                status: TaskInstanceStatus::Pending,
                due_date,
                completed_at: None,
                occurrence_key: Some(key),
            };

            // `insert_task_instance` itself collapses a concurrent racing
            // insert to the existing row; the `get` above just avoids
            // pointless churn on the common repeated-expansion path.
            self.store.insert_task_instance(instance).await?;
            created += 1;
        }

        self.enqueue_continuation(schedule.id).await?;
        Ok(created)
    }

    async fn enqueue_continuation(&self, schedule_id: Uuid) -> Result<(), HearthError> {
        let now = self.clock.now();
        let bucket = now.timestamp() / self.config.continuation_interval_secs.max(1);
        let run_at = now + chrono::Duration::seconds(self.config.continuation_interval_secs);
        let req = EnqueueRequest::new("recurrence", "recurrence.expand", serde_json::json!({ "schedule_id": schedule_id }))
            .with_run_at(run_at)
            .with_idempotency_key(format!("expand:{schedule_id}:{bucket}"));
        self.queue.enqueue(req).await.map(|_| ())
    }
}

/// `max(start_date, today - rewind_days)`.
fn window_floor(start_date: NaiveDate, today: NaiveDate, rewind_days: i64) -> NaiveDate {
    start_date.max(today - chrono::Duration::days(rewind_days))
}

#[async_trait]
impl Handler for RecurrenceEngine {
    async fn handle(&self, ctx: HandlerContext, payload: serde_json::Value) -> HandlerOutcome {
        let payload: ExpandPayload = match serde_json::from_value(payload) {
            Ok(p) => p,
            Err(e) => return HandlerOutcome::Terminal(format!("malformed expand payload: {e}")),
        };

        if ctx.cancelled() {
            return HandlerOutcome::Retry("cancelled before expansion started".into());
        }

        match self.expand(payload.schedule_id).await {
            Ok(created) => {
                debug!(job_id = %ctx.job_id, schedule_id = %payload.schedule_id, created, "expansion complete");
                HandlerOutcome::Ok
            }
            Err(HearthError::NotFound(_)) => {
                warn!(schedule_id = %payload.schedule_id, "schedule not found, dropping expansion");
                HandlerOutcome::Terminal("schedule not found".into())
            }
            Err(HearthError::Validation(msg)) => HandlerOutcome::Terminal(msg),
            Err(e) => HandlerOutcome::Retry(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::{FakeClock, Recurrence, ScheduleDefinition};
    use hearth_job::HandlerRegistry;
    use hearth_persistence::InMemoryStore;

    fn setup() -> (Arc<FakeClock>, Arc<dyn Store>, Arc<JobQueue>) {
        let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let queue = Arc::new(JobQueue::new(store.clone(), clock.clone(), Arc::new(HandlerRegistry::new())));
        (clock, store, queue)
    }

    #[tokio::test]
    async fn expands_daily_schedule_exactly_once_across_repeated_runs() {
        let (clock, store, queue) = setup();
        let today = clock.now().date_naive();

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
            start_date: today,
            end_date: None,
            horizon_days: 2,
            active: true,
        };
        let schedule_id = schedule.id;
        store.insert_schedule(schedule).await.unwrap();

        let engine = RecurrenceEngine::new(store.clone(), clock.clone(), queue, RecurrenceConfig::default());
        let created_first = engine.expand(schedule_id).await.unwrap();
        assert_eq!(created_first, 3); // today, +1, +2

        let created_second = engine.expand(schedule_id).await.unwrap();
        assert_eq!(created_second, 0, "second expansion should create nothing new");

        let instances = store.list_task_instances_for_schedule(schedule_id).await.unwrap();
        assert_eq!(instances.len(), 3);
    }

    #[tokio::test]
    async fn rewind_rule_never_materialises_before_floor() {
        let (clock, store, queue) = setup();
        let today = clock.now().date_naive();
        let start_date = today - chrono::Duration::days(10);

        let schedule = ScheduleDefinition {
            id: Uuid::new_v4(),
            family_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "Daily standup".into(),
            description: None,
            task_type: "chore".into(),
            default_priority: 0,
            default_assignee: None,
            recurrence: Recurrence::Daily,
            timezone: "UTC".into(),
            start_date,
            end_date: None,
            horizon_days: 0,
            active: true,
        };
        let schedule_id = schedule.id;
        store.insert_schedule(schedule).await.unwrap();

        // rewind_days = 0 (default): nothing earlier than `today` should materialise.
        let engine = RecurrenceEngine::new(store.clone(), clock.clone(), queue, RecurrenceConfig::default());
        engine.expand(schedule_id).await.unwrap();

        let instances = store.list_task_instances_for_schedule(schedule_id).await.unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].due_date, today);
    }

    #[tokio::test]
    async fn inactive_schedule_is_skipped() {
        let (clock, store, queue) = setup();
        let today = clock.now().date_naive();

        let schedule = ScheduleDefinition {
            id: Uuid::new_v4(),
            family_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "Paused chore".into(),
            description: None,
            task_type: "chore".into(),
            default_priority: 0,
            default_assignee: None,
            recurrence: Recurrence::Daily,
            timezone: "UTC".into(),
            start_date: today,
            end_date: None,
            horizon_days: 5,
            active: false,
        };
        let schedule_id = schedule.id;
        store.insert_schedule(schedule).await.unwrap();

        let engine = RecurrenceEngine::new(store.clone(), clock, queue, RecurrenceConfig::default());
        let created = engine.expand(schedule_id).await.unwrap();
        assert_eq!(created, 0);
    }
}
