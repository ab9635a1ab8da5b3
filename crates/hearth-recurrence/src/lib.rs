//! # hearth-recurrence
//!
//! Expands [`hearth_core::ScheduleDefinition`]s into dated
//! [`hearth_core::TaskInstance`]s. The public surface is
//! [`RecurrenceEngine`], registered in a `HandlerRegistry` under
//! `recurrence.expand`.

mod engine;
mod occurrences;

pub use engine::{RecurrenceConfig, RecurrenceEngine};
pub use occurrences::{enumerate, RecurrenceError};
