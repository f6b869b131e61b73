//! Ephemeral single-task worker.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use strata_core::ports::{PipelineRepository, ResultSink, TaskQueue};
use strata_core::task::{TaskResult, WorkTask, meta};
use strata_core::{Error, Result, TaskId, WorkerId};
use strata_runner::{CancelProbe, ExecutionEngine, PlanCache};
use tracing::{error, info, warn};

/// Collaborators shared by every worker in a process.
pub struct WorkerContext {
    pub queue: Arc<dyn TaskQueue>,
    pub pipelines: Arc<dyn PipelineRepository>,
    pub engine: Arc<ExecutionEngine>,
    pub sink: Arc<dyn ResultSink>,
    pub plans: PlanCache,
}

impl WorkerContext {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        pipelines: Arc<dyn PipelineRepository>,
        engine: Arc<ExecutionEngine>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            queue,
            pipelines,
            engine,
            sink,
            plans: PlanCache::new(),
        }
    }
}

/// Status reported back to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// Cancel probe backed by the task's `cancel_requested` flag.
pub struct QueueCancelProbe {
    queue: Arc<dyn TaskQueue>,
    task_id: TaskId,
}

impl QueueCancelProbe {
    pub fn new(queue: Arc<dyn TaskQueue>, task_id: TaskId) -> Self {
        Self { queue, task_id }
    }
}

#[async_trait]
impl CancelProbe for QueueCancelProbe {
    async fn is_cancelled(&self) -> bool {
        match self.queue.get(self.task_id).await {
            Ok(task) => task.is_some_and(|t| t.cancel_requested),
            Err(e) => {
                warn!(task_id = %self.task_id, error = %e, "Cancel probe could not read task");
                false
            }
        }
    }
}

/// Bound to exactly one task for its whole lifetime.
pub struct Worker {
    id: WorkerId,
    task: WorkTask,
    context: Arc<WorkerContext>,
}

impl Worker {
    pub fn new(task: WorkTask, context: Arc<WorkerContext>) -> Self {
        Self {
            id: WorkerId::new(),
            task,
            context,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Run the task to a terminal status and report it. Consumes the worker.
    pub async fn run(self) -> Result<WorkerOutcome> {
        let task_id = self.task.id;
        let queue = Arc::clone(&self.context.queue);

        if let Err(e) = queue
            .annotate(task_id, meta::WORKER_ID, &self.id.to_string())
            .await
        {
            warn!(task_id = %task_id, error = %e, "Failed to record worker id");
        }

        info!(
            task_id = %task_id,
            worker_id = %self.id,
            pipeline_id = %self.task.task_spec.pipeline_id,
            "Worker started"
        );

        let outcome = self.execute().await;
        match &outcome {
            WorkerOutcome::Completed => info!(task_id = %task_id, "Task completed"),
            WorkerOutcome::Failed(reason) => error!(task_id = %task_id, error = %reason, "Task failed"),
            WorkerOutcome::Cancelled => info!(task_id = %task_id, "Task cancelled"),
        }
        Ok(outcome)
    }

    async fn execute(&self) -> WorkerOutcome {
        let task_id = self.task.id;
        let queue = &self.context.queue;

        let report = match self.run_pipeline().await {
            Ok(report) => report,
            Err(RunError::Cancelled(detail)) => {
                return match queue.mark_cancelled(task_id, Some(detail.clone())).await {
                    Ok(()) => WorkerOutcome::Cancelled,
                    Err(e) => WorkerOutcome::Failed(format!("{detail}; reporting cancel: {e}")),
                };
            }
            Err(RunError::Failed(reason)) => return self.report_failure(reason).await,
        };

        let location = match self.context.sink.write(&self.task, &report.context).await {
            Ok(location) => location,
            Err(e) => return self.report_failure(format!("writing results: {e}")).await,
        };

        let result = TaskResult {
            location,
            steps_executed: report.steps_executed,
            context_keys: report.context.keys().map(str::to_string).collect(),
        };
        match queue.complete(task_id, result).await {
            Ok(()) => WorkerOutcome::Completed,
            Err(e) => WorkerOutcome::Failed(format!("reporting completion: {e}")),
        }
    }

    async fn run_pipeline(&self) -> std::result::Result<strata_runner::RunReport, RunError> {
        let pipeline_id = self.task.task_spec.pipeline_id;
        let stored = self
            .context
            .pipelines
            .get(pipeline_id)
            .await
            .map_err(RunError::from)?
            .ok_or_else(|| RunError::from(Error::PipelineNotFound(pipeline_id.to_string())))?;
        let plan = self
            .context
            .plans
            .get_or_parse(pipeline_id, &stored.source)
            .map_err(RunError::from)?;

        let params = run_parameters(&self.task);
        let probe = QueueCancelProbe::new(Arc::clone(&self.context.queue), self.task.id);

        self.context
            .engine
            .run(&plan, &params, &probe)
            .await
            .map_err(|failure| {
                let cancelled = failure.error.is_cancelled();
                let message = Error::from(failure.error).to_string();
                if cancelled {
                    RunError::Cancelled(message)
                } else {
                    RunError::Failed(message)
                }
            })
    }

    async fn report_failure(&self, reason: String) -> WorkerOutcome {
        if let Err(e) = self.context.queue.fail(self.task.id, reason.clone()).await {
            return WorkerOutcome::Failed(format!("{reason}; reporting failure: {e}"));
        }
        WorkerOutcome::Failed(reason)
    }
}

enum RunError {
    Failed(String),
    Cancelled(String),
}

impl From<Error> for RunError {
    fn from(err: Error) -> Self {
        RunError::Failed(err.to_string())
    }
}

/// Task parameters plus the task's data-access spec. Explicit parameters win.
fn run_parameters(task: &WorkTask) -> HashMap<String, Value> {
    let mut params = task.task_spec.parameters.clone();
    params
        .entry("inputs".to_string())
        .or_insert_with(|| json!(task.data_access.input_datasets));
    if let Some(location) = &task.data_access.output_location {
        params
            .entry("output_location".to_string())
            .or_insert_with(|| json!(location));
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::task::DataAccessSpec;
    use strata_core::{PipelineId, ProjectId};

    #[test]
    fn test_parameters_include_data_access() {
        let task = WorkTask::pipeline_execution(PipelineId::new(), ProjectId::new("acme"))
            .with_parameter("inputs", json!("override"))
            .with_data_access(DataAccessSpec {
                input_datasets: vec!["ds1".into()],
                output_location: Some("out.json".into()),
            });
        let params = run_parameters(&task);
        assert_eq!(params["inputs"], json!("override"));
        assert_eq!(params["output_location"], json!("out.json"));
    }
}
