//! # hearth-job
//!
//! The durable job queue: [`JobQueue`] for enqueue/claim/heartbeat/
//! complete/fail/cancel, [`HandlerRegistry`] for `job_type` → handler
//! bindings, [`WorkerPool`] for bounded concurrent execution, and
//! [`Scheduler`] for periodic recurring-job enqueue and lease reclamation.

mod backoff;
mod config;
mod queue;
mod registry;
mod scheduler;
mod worker;

pub use backoff::BackoffPolicy;
pub use config::{JobQueueConfig, SchedulerConfig, WorkerPoolConfig};
pub use queue::{EnqueueRequest, FailureOutcome, JobQueue};
pub use registry::{Handler, HandlerContext, HandlerOutcome, HandlerRegistration, HandlerRegistry};
pub use scheduler::Scheduler;
pub use worker::{WorkerPool, WorkerPoolMetrics, WorkerPoolMetricsSnapshot};
