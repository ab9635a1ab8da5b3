//! Error taxonomy shared by every core crate.
//!
//! This is a taxonomy of *kinds*, not a catch-all for every possible
//! failure — crates with failure modes that don't fit here (e.g. token
//! signature verification) define their own `thiserror` enum and convert
//! into [`HearthError`] only at the boundary where a generic caller needs
//! one stable type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HearthError {
    /// Malformed input. Never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced entity absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness violation. Callers translate this into idempotent
    /// success at `occurrence_key` / `idempotency_key`; surfaced
    /// otherwise.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A worker tried to act on a job lease it no longer holds.
    #[error("worker is not the lease holder for this job")]
    NotLeaseHolder,

    /// Transient storage failure. Retried internally a bounded number of
    /// times by the `Store` implementation; if it still propagates, the
    /// calling handler invocation fails as retryable.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A handler asked for a retry.
    #[error("handler requested retry: {0}")]
    HandlerRetry(String),

    /// A handler asked for no further retries.
    #[error("handler requested terminal failure: {0}")]
    HandlerTerminal(String),

    /// AuthMode upgrade throttle tripped.
    #[error("rate limited: too many upgrade attempts")]
    RateLimited,

    /// Token signature/shape rejected.
    #[error("invalid token: {0}")]
    Invalid(String),

    /// `AuthMode::upgrade` password mismatch - distinct from `Invalid` so
    /// callers can tell "bad token" from "bad password".
    #[error("incorrect password")]
    InvalidPassword,

    /// Token outside its validity window.
    #[error("token expired")]
    Expired,
}

impl HearthError {
    /// Whether a `JobQueue` caller should schedule a retry for this error,
    /// as opposed to marking the job permanently failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HearthError::StorageUnavailable(_) | HearthError::HandlerRetry(_)
        )
    }
}

pub type HearthResult<T> = Result<T, HearthError>;
