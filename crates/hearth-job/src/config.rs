//! Configuration knobs, loaded from the environment with
//! `std::env::var` + `.parse()` — no file-based config parser, matching
//! the ambient-config style used across the workspace.

use std::time::Duration;

fn env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub worker_count: usize,
    pub poll_interval: Duration,
    pub lease_ttl: Duration,
    pub shutdown_grace: Duration,
    pub queues: Vec<String>,
    pub claim_batch: usize,
    /// Handler invocation deadlines are `lease_expires_at - safety_margin`,
    /// leaving room for the `Complete`/`Fail` call to land before the lease
    /// itself expires.
    pub safety_margin: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            poll_interval: Duration::from_secs(1),
            lease_ttl: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(30),
            queues: Vec::new(),
            claim_batch: 1,
            safety_margin: Duration::from_secs(5),
        }
    }
}

impl WorkerPoolConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            worker_count: env_usize("HEARTH_WORKER_COUNT", default.worker_count),
            poll_interval: env_duration_secs("HEARTH_POLL_INTERVAL_SECS", default.poll_interval),
            lease_ttl: env_duration_secs("HEARTH_LEASE_TTL_SECS", default.lease_ttl),
            shutdown_grace: env_duration_secs("HEARTH_SHUTDOWN_GRACE_SECS", default.shutdown_grace),
            queues: std::env::var("HEARTH_QUEUES")
                .ok()
                .map(|v| v.split(',').map(str::to_string).collect())
                .unwrap_or(default.queues),
            claim_batch: env_usize("HEARTH_CLAIM_BATCH", default.claim_batch),
            safety_margin: env_duration_secs("HEARTH_SAFETY_MARGIN_SECS", default.safety_margin),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobQueueConfig {
    pub job_retention: Duration,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self { job_retention: Duration::from_secs(7 * 24 * 60 * 60) }
    }
}

impl JobQueueConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            job_retention: env_duration_secs("HEARTH_JOB_RETENTION_SECS", default.job_retention),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick: Duration,
    pub jitter_max_secs: u64,
    pub enqueue_gc: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(30),
            jitter_max_secs: 2,
            enqueue_gc: true,
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            tick: env_duration_secs("HEARTH_SCHEDULER_TICK_SECS", default.tick),
            jitter_max_secs: env_i64("HEARTH_SCHEDULER_JITTER_SECS", default.jitter_max_secs as i64).max(0) as u64,
            enqueue_gc: std::env::var("HEARTH_SCHEDULER_ENQUEUE_GC")
                .ok()
                .map(|v| v != "0" && v.to_lowercase() != "false")
                .unwrap_or(default.enqueue_gc),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let pool = WorkerPoolConfig::default();
        assert_eq!(pool.worker_count, 4);
        assert_eq!(pool.poll_interval, Duration::from_secs(1));
        assert_eq!(pool.lease_ttl, Duration::from_secs(60));
        assert_eq!(pool.shutdown_grace, Duration::from_secs(30));

        let scheduler = SchedulerConfig::default();
        assert_eq!(scheduler.tick, Duration::from_secs(30));
    }
}
