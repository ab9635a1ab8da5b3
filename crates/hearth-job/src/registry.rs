//! Maps `job_type` to a handler plus its declared retry policy.
//!
//! Registrations happen once at startup; the registry is read-mostly after
//! that, consistent with the no-singletons design note — it's still passed
//! around as an explicit `Arc`, not reached for as a global.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::backoff::BackoffPolicy;

/// What a handler invocation reports back to the worker pool.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    Ok,
    Retry(String),
    Terminal(String),
}

/// Execution context passed into every handler invocation. Handlers should
/// check `cancelled()` at natural boundaries rather than relying on being
/// interrupted.
#[derive(Clone)]
pub struct HandlerContext {
    pub job_id: uuid::Uuid,
    pub attempt: i32,
    cancel: CancellationToken,
}

impl HandlerContext {
    pub fn new(job_id: uuid::Uuid, attempt: i32, cancel: CancellationToken) -> Self {
        Self { job_id, attempt, cancel }
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled_owned(&self) {
        self.cancel.cancelled().await
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: HandlerContext, payload: Value) -> HandlerOutcome;
}

/// A single handler registration: the handler itself plus the retry policy
/// the worker pool applies to its failures.
#[derive(Clone)]
pub struct HandlerRegistration {
    pub handler: Arc<dyn Handler>,
    pub max_attempts: i32,
    pub lease_ttl: Duration,
    pub backoff: BackoffPolicy,
}

/// Populated once at startup, then shared read-only across workers.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, HandlerRegistration>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        job_type: impl Into<String>,
        handler: Arc<dyn Handler>,
        max_attempts: i32,
        lease_ttl: Duration,
        backoff: BackoffPolicy,
    ) -> &mut Self {
        self.handlers.insert(
            job_type.into(),
            HandlerRegistration { handler, max_attempts, lease_ttl, backoff },
        );
        self
    }

    pub fn get(&self, job_type: &str) -> Option<&HandlerRegistration> {
        self.handlers.get(job_type)
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl Handler for NoopHandler {
        async fn handle(&self, _ctx: HandlerContext, _payload: Value) -> HandlerOutcome {
            HandlerOutcome::Ok
        }
    }

    #[test]
    fn unknown_type_is_absent() {
        let registry = HandlerRegistry::new();
        assert!(!registry.contains("nope"));
    }

    #[test]
    fn registers_and_looks_up() {
        let mut registry = HandlerRegistry::new();
        registry.register(
            "noop",
            Arc::new(NoopHandler),
            3,
            Duration::from_secs(60),
            BackoffPolicy::default(),
        );
        assert!(registry.contains("noop"));
        assert_eq!(registry.get("noop").unwrap().max_attempts, 3);
    }
}
