//! Persistence adapters for Strata.
//!
//! The in-memory adapters back tests and single-process deployments; the
//! PostgreSQL adapters are durable across restarts.

pub mod memory;
pub mod postgres;
mod transition;

pub use memory::{MemoryPipelineRepository, MemoryScheduleRepository, MemoryTaskQueue};
pub use postgres::{Database, PgPipelineRepository, PgScheduleRepository, PgTaskQueue};
