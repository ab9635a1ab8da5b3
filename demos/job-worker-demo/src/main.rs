//! # Job Worker Demo
//!
//! Registers a couple of handlers, enqueues work (including one that
//! fails twice before succeeding), runs a small worker pool against it,
//! and prints the final queue stats. No database required — everything
//! runs against the in-memory `Store`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use hearth_core::SystemClock;
use hearth_job::{
    BackoffPolicy, EnqueueRequest, Handler, HandlerContext, HandlerOutcome, HandlerRegistry,
    JobQueue, WorkerPool, WorkerPoolConfig,
};
use hearth_persistence::{InMemoryStore, Store};
use serde_json::json;

// ============================================================================
// Handlers
// ============================================================================

struct GreetHandler;

#[async_trait]
impl Handler for GreetHandler {
    async fn handle(&self, ctx: HandlerContext, payload: serde_json::Value) -> HandlerOutcome {
        let name = payload.get("name").and_then(|v| v.as_str()).unwrap_or("friend");
        println!("[job {}] hello, {name}!", ctx.job_id);
        HandlerOutcome::Ok
    }
}

/// Fails on its first two attempts, then succeeds - demonstrates the
/// retry-with-backoff path end to end.
struct FlakyHandler {
    calls: AtomicU32,
}

#[async_trait]
impl Handler for FlakyHandler {
    async fn handle(&self, ctx: HandlerContext, _payload: serde_json::Value) -> HandlerOutcome {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        println!("[job {}] flaky handler attempt {}", ctx.job_id, ctx.attempt);
        if call < 3 {
            HandlerOutcome::Retry(format!("simulated failure #{call}"))
        } else {
            HandlerOutcome::Ok
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let clock = Arc::new(SystemClock::new());

    let mut registry = HandlerRegistry::new();
    registry.register("greet", Arc::new(GreetHandler), 3, Duration::from_secs(30), BackoffPolicy::default());
    registry.register(
        "flaky",
        Arc::new(FlakyHandler { calls: AtomicU32::new(0) }),
        5,
        Duration::from_secs(30),
        BackoffPolicy::new(Duration::from_millis(200), Duration::from_secs(2)),
    );
    let registry = Arc::new(registry);

    let queue = Arc::new(JobQueue::new(store.clone(), clock.clone(), registry.clone()));

    queue.enqueue(EnqueueRequest::new("default", "greet", json!({ "name": "Ada" }))).await?;
    queue.enqueue(EnqueueRequest::new("default", "greet", json!({ "name": "Grace" }))).await?;
    queue.enqueue(EnqueueRequest::new("default", "flaky", json!({}))).await?;

    let config = WorkerPoolConfig { worker_count: 2, poll_interval: Duration::from_millis(100), ..Default::default() };
    let pool = WorkerPool::new(config, queue.clone(), registry, clock);
    let handles = pool.spawn();

    tokio::time::sleep(Duration::from_secs(2)).await;
    pool.shutdown();
    for handle in handles {
        let _ = handle.await;
    }

    let stats = queue.stats().await?;
    println!("final stats: {stats:?}");
    let metrics = pool.metrics();
    println!("pool metrics: {metrics:?}");

    Ok(())
}
