//! Strata Core
//!
//! Core domain types, traits, and error handling for the Strata pipeline
//! orchestration engine. This crate has minimal dependencies and defines the
//! shared vocabulary used by the parser, engine, queue, scheduler and worker.

pub mod context;
pub mod error;
pub mod ids;
pub mod interpolation;
pub mod pipeline;
pub mod ports;
pub mod schedule;
pub mod task;

pub use context::{ContextLimits, ContextWindow};
pub use error::{Error, Result};
pub use ids::*;
