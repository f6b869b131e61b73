//! Recurring schedules and orchestration for Strata.
//!
//! A single [`Scheduler`] owns every live trigger and drives them from one
//! coordination loop. The [`ScheduleRegistry`] keeps persisted schedules and
//! live triggers in step, and the [`Orchestrator`] is the programmatic
//! surface used by the CLI and any HTTP front door.

pub mod registry;
pub mod scheduler;
pub mod service;
pub mod trigger;

pub use registry::ScheduleRegistry;
pub use scheduler::{FireReport, Scheduler, SchedulerConfig};
pub use service::Orchestrator;
pub use trigger::TriggerExpression;
