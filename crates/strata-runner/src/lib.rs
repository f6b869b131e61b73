//! Pipeline parser and step execution engine for Strata.

pub mod cache;
pub mod engine;
pub mod error;
pub mod parser;
pub mod plan;

pub use cache::PlanCache;
pub use engine::{
    CancelProbe, EngineConfig, ExecutionEngine, NeverCancel, RunFailure, RunOutcome, RunReport,
};
pub use error::ExecutionError;
pub use parser::{get_name, parse};
pub use plan::{Control, ExecutionPlan, OnError, PlanStep};
