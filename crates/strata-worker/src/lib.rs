//! Worker lifecycle manager for Strata.
//!
//! Every claimed task gets its own ephemeral [`Worker`], which runs the
//! pipeline, writes the result, reports the outcome and is dropped.

pub mod config;
pub mod manager;
pub mod sink;
pub mod worker;

pub use config::WorkerConfig;
pub use manager::WorkerManager;
pub use sink::FileResultSink;
pub use worker::{QueueCancelProbe, Worker, WorkerContext, WorkerOutcome};
