//! # Family Scheduler Demo
//!
//! Two independent walkthroughs against the in-memory store:
//!
//! 1. A weekly `ScheduleDefinition` is expanded into `TaskInstance`s by
//!    the recurrence engine, then expanded again to show the
//!    materialisation is idempotent.
//! 2. A login issues a bearer token, which is downgraded to shared mode
//!    and then upgraded back with a password check.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use hearth_auth::{AuthMode, AuthModeConfig, Credentials, HmacSigner, LoginIdentity, RateLimiter};
use hearth_core::{Clock, FullRole, HearthResult, Recurrence, ScheduleDefinition, SystemClock};
use hearth_job::{HandlerRegistry, JobQueue};
use hearth_persistence::{InMemoryStore, Store};
use hearth_recurrence::RecurrenceEngine;
use uuid::Uuid;

/// A stand-in for a real credentials backend: one hardcoded admin.
struct FixedCredentials {
    user_id: Uuid,
    family_id: Uuid,
    password: &'static str,
}

#[async_trait]
impl Credentials for FixedCredentials {
    async fn login(&self, _email: &str, password: &str) -> HearthResult<LoginIdentity> {
        if password != self.password {
            return Err(hearth_core::HearthError::Invalid("bad credentials".into()));
        }
        Ok(LoginIdentity { user_id: self.user_id, family_id: self.family_id, role: FullRole::Admin })
    }

    async fn verify_password(&self, _user_id: Uuid, password: &str) -> HearthResult<bool> {
        Ok(password == self.password)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    recurrence_walkthrough().await?;
    println!();
    auth_walkthrough().await?;

    Ok(())
}

async fn recurrence_walkthrough() -> Result<()> {
    println!("== recurrence ==");

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let clock = Arc::new(SystemClock::new());
    let registry = Arc::new(HandlerRegistry::new());
    let queue = Arc::new(JobQueue::new(store.clone(), clock.clone(), registry));
    let engine = RecurrenceEngine::new(store.clone(), clock.clone(), queue, Default::default());

    let today = clock.now().date_naive();
    let weekday = today.format("%u").to_string().parse::<u8>().unwrap_or(1) - 1; // Mon=0
    let schedule = ScheduleDefinition {
        id: Uuid::new_v4(),
        family_id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        title: "Take out the bins".into(),
        description: None,
        task_type: "chore".into(),
        default_priority: 0,
        default_assignee: None,
        recurrence: Recurrence::Weekly { weekdays: [weekday].into_iter().collect() },
        timezone: "UTC".into(),
        start_date: today,
        end_date: None,
        horizon_days: 14,
        active: true,
    };
    store.insert_schedule(schedule.clone()).await?;

    let created = engine.expand(schedule.id).await?;
    println!("first expand materialised {created} instance(s)");

    let created_again = engine.expand(schedule.id).await?;
    println!("second expand materialised {created_again} instance(s) (idempotent)");

    let instances = store.list_task_instances_for_schedule(schedule.id).await?;
    for instance in instances {
        println!("  - due {} ({:?})", instance.due_date, instance.status);
    }

    Ok(())
}

async fn auth_walkthrough() -> Result<()> {
    println!("== auth ==");

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let signer = Arc::new(HmacSigner::new(b"demo-only-secret-do-not-use-in-prod"));
    let credentials = Arc::new(FixedCredentials {
        user_id: Uuid::new_v4(),
        family_id: Uuid::new_v4(),
        password: "correct horse",
    });
    let rate_limiter = RateLimiter::new(store, clock.clone(), Duration::from_secs(15 * 60), 5);
    let auth = AuthMode::new(signer, clock, credentials, rate_limiter, AuthModeConfig::default());

    let token = auth.login("parent@example.com", "correct horse").await?;
    let session = auth.validate(&token)?;
    println!("logged in at {} as {:?}", Utc::now(), session.effective_role);

    let shared_token = auth.downgrade(&token).await?;
    let shared_session = auth.validate(&shared_token)?;
    println!("downgraded to {:?}", shared_session.effective_role);

    let restored_token = auth.upgrade(&shared_token, "correct horse").await?;
    let restored_session = auth.validate(&restored_token)?;
    println!("upgraded back to {:?}", restored_session.effective_role);

    Ok(())
}
