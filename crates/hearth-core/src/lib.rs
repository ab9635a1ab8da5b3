//! # hearth-core
//!
//! Shared foundations for the Hearth backend execution core: the
//! injectable [`Clock`], the data model ([`Job`], [`ScheduleDefinition`],
//! [`TaskInstance`], [`Session`], [`UpgradeAttempts`]), and the
//! [`HearthError`] taxonomy.
//!
//! Nothing in this crate performs IO. It exists so that `hearth-job`,
//! `hearth-recurrence`, and `hearth-auth` share one vocabulary instead of
//! each rolling their own job/session/error types.

mod clock;
mod error;
mod model;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{HearthError, HearthResult};
pub use model::{
    FullRole, Job, JobStatus, OccurrenceKey, Recurrence, Role, ScheduleDefinition, Session,
    TaskInstance, TaskInstanceStatus, UpgradeAttempts,
};
