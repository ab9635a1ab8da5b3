//! # hearth-testing
//!
//! Shared fixtures for the rest of the workspace: builders for
//! [`hearth_core::Job`]/[`hearth_core::ScheduleDefinition`]/
//! [`hearth_core::TaskInstance`], and a couple of clock helpers tests
//! reach for repeatedly.

mod builders;
mod clock_ext;

pub use builders::{task_instance, JobBuilder, ScheduleBuilder};
pub use clock_ext::random_suffix;
