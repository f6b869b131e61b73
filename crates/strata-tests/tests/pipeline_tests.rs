//! Full path from enqueue to completion on PostgreSQL.
//!
//! Run with: `cargo test -p strata-tests --features integration`

#![cfg(feature = "integration")]

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use strata_core::task::{DataAccessSpec, TaskStatus};
use strata_core::ProjectId;
use strata_plugins::PluginRegistry;
use strata_plugins::builtin::HttpPluginConfig;
use strata_runner::{EngineConfig, ExecutionEngine};
use strata_scheduler::{Orchestrator, Scheduler, SchedulerConfig};
use strata_tests::{COUNTING_PIPELINE, PROJECT, TestContext};
use strata_worker::{FileResultSink, WorkerConfig, WorkerContext, WorkerManager, WorkerOutcome};

#[tokio::test]
async fn test_enqueued_pipeline_runs_to_completion() {
    let ctx = TestContext::start().await.expect("Failed to create context");
    let results = tempfile::tempdir().unwrap();

    let schedules = Arc::new(ctx.db.schedules());
    let pipelines = Arc::new(ctx.db.pipelines());
    let queue = Arc::new(ctx.db.task_queue());

    let scheduler = Scheduler::new(schedules.clone(), queue.clone(), SchedulerConfig::default());
    let orchestrator = Orchestrator::new(schedules, pipelines.clone(), queue.clone(), scheduler);

    let pipeline = orchestrator
        .register_pipeline(ProjectId::new(PROJECT), COUNTING_PIPELINE)
        .await
        .unwrap();
    let task_id = orchestrator
        .execute_pipeline(pipeline.id, HashMap::new(), DataAccessSpec::default(), 0)
        .await
        .unwrap();

    let registry = Arc::new(PluginRegistry::with_builtins(HttpPluginConfig::default()).unwrap());
    let engine = Arc::new(ExecutionEngine::new(registry, EngineConfig::default()));
    let context = Arc::new(WorkerContext::new(
        queue,
        pipelines,
        engine,
        Arc::new(FileResultSink::new(results.path())),
    ));
    let manager = WorkerManager::new(WorkerConfig::default(), context);

    let handle = manager.process_next().await.unwrap().expect("task claimed");
    assert_eq!(handle.await.unwrap(), WorkerOutcome::Completed);

    let task = orchestrator.get_task_status(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    let result = task.result.unwrap();
    assert_eq!(result.steps_executed, 4);

    let location = result.location.unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(location).unwrap()).unwrap();
    assert_eq!(written["total"], json!(3));
}
