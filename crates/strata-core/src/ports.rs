//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the orchestration core and its
//! persistence and output collaborators.

use crate::context::ContextWindow;
use crate::ids::*;
use crate::pipeline::StoredPipeline;
use crate::schedule::Schedule;
use crate::task::{CancelOutcome, TaskResult, TaskStatus, WorkTask};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable store of schedules.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Insert or replace a schedule.
    async fn save(&self, schedule: &Schedule) -> Result<()>;

    /// Get a schedule by ID.
    async fn get(&self, id: ScheduleId) -> Result<Option<Schedule>>;

    /// List all schedules.
    async fn list(&self) -> Result<Vec<Schedule>>;

    /// List schedules owned by a project.
    async fn list_by_project(&self, project_id: &ProjectId) -> Result<Vec<Schedule>>;

    /// Delete a schedule. Deleting an unknown id is a `ScheduleNotFound` error.
    async fn delete(&self, id: ScheduleId) -> Result<()>;

    /// Record a firing of `cron_schedule`.
    ///
    /// `last_run` is always written. `next_run` is written only while the
    /// schedule is enabled and still carries `cron_schedule`; other fields
    /// are untouched. Returns the stored schedule, or `None` if it is gone.
    async fn record_run(
        &self,
        id: ScheduleId,
        cron_schedule: &str,
        last_run: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<Option<Schedule>>;
}

/// Store of pipeline sources.
#[async_trait]
pub trait PipelineRepository: Send + Sync {
    /// Insert or replace a pipeline.
    async fn save(&self, pipeline: &StoredPipeline) -> Result<()>;

    /// Get a pipeline by ID.
    async fn get(&self, id: PipelineId) -> Result<Option<StoredPipeline>>;

    /// Check whether a pipeline exists.
    async fn exists(&self, id: PipelineId) -> Result<bool> {
        Ok(self.get(id).await?.is_some())
    }

    /// List pipelines owned by a project.
    async fn list_by_project(&self, project_id: &ProjectId) -> Result<Vec<StoredPipeline>>;

    /// Delete a pipeline.
    async fn delete(&self, id: PipelineId) -> Result<()>;
}

/// Durable work queue with exclusive claim semantics.
///
/// Implementations perform no automatic retries: a failed task is terminal.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Validate and persist a task with status `Queued`.
    async fn enqueue(&self, task: WorkTask) -> Result<TaskId>;

    /// Claim the next eligible task (priority descending, then submission
    /// time ascending), moving it to `Running`.
    async fn claim(&self) -> Result<Option<WorkTask>>;

    /// Claim a specific task. Exactly one of any number of concurrent callers
    /// succeeds; the others get `ClaimConflict`.
    async fn claim_task(&self, id: TaskId) -> Result<WorkTask>;

    /// `Running` to `Completed`. Rejected with `TaskTerminal` on terminal tasks.
    async fn complete(&self, id: TaskId, result: TaskResult) -> Result<()>;

    /// `Running` to `Failed`.
    async fn fail(&self, id: TaskId, error: String) -> Result<()>;

    /// Cancel a queued task, or request cancellation of a running one.
    async fn cancel(&self, id: TaskId, reason: Option<String>) -> Result<CancelOutcome>;

    /// `Running` to `Cancelled`, once the worker has observed the request.
    async fn mark_cancelled(&self, id: TaskId, detail: Option<String>) -> Result<()>;

    /// Attach audit metadata. Allowed in every status.
    async fn annotate(&self, id: TaskId, key: &str, value: &str) -> Result<()>;

    /// Get a task by ID.
    async fn get(&self, id: TaskId) -> Result<Option<WorkTask>>;

    /// List tasks, newest first, optionally filtered by status.
    async fn list(&self, status: Option<TaskStatus>, limit: usize) -> Result<Vec<WorkTask>>;
}

/// Destination for a finished run's context window.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Persist the final context of a task's run and return where it went.
    async fn write(&self, task: &WorkTask, context: &ContextWindow) -> Result<Option<String>>;
}
