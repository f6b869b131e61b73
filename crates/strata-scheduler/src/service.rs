//! Orchestration service facade.

use crate::registry::ScheduleRegistry;
use crate::scheduler::{FireReport, Scheduler};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use strata_core::pipeline::StoredPipeline;
use strata_core::ports::{PipelineRepository, ScheduleRepository, TaskQueue};
use strata_core::schedule::{NewSchedule, Schedule, ScheduleUpdate};
use strata_core::task::{CancelOutcome, DataAccessSpec, WorkTask, meta};
use strata_core::{Error, PipelineId, ProjectId, Result, ScheduleId, TaskId};
use tracing::info;

/// Programmatic surface for the CLI and HTTP layers.
pub struct Orchestrator {
    registry: ScheduleRegistry,
    scheduler: Arc<Scheduler>,
    queue: Arc<dyn TaskQueue>,
    pipelines: Arc<dyn PipelineRepository>,
}

impl Orchestrator {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        pipelines: Arc<dyn PipelineRepository>,
        queue: Arc<dyn TaskQueue>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            registry: ScheduleRegistry::new(schedules, Arc::clone(&pipelines), Arc::clone(&scheduler)),
            scheduler,
            queue,
            pipelines,
        }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub async fn create_schedule(&self, request: NewSchedule) -> Result<Schedule> {
        self.registry.create(request).await
    }

    pub async fn update_schedule(&self, id: ScheduleId, update: ScheduleUpdate) -> Result<Schedule> {
        self.registry.update(id, update).await
    }

    pub async fn delete_schedule(&self, id: ScheduleId) -> Result<()> {
        self.registry.delete(id).await
    }

    pub async fn get_schedule(&self, id: ScheduleId) -> Result<Schedule> {
        self.registry.get(id).await
    }

    pub async fn list_schedules(&self) -> Result<Vec<Schedule>> {
        self.registry.list().await
    }

    pub async fn list_schedules_by_project(&self, project_id: &ProjectId) -> Result<Vec<Schedule>> {
        self.registry.list_by_project(project_id).await
    }

    /// Fire a schedule immediately, outside its cadence.
    pub async fn fire_schedule(&self, id: ScheduleId) -> Result<FireReport> {
        self.scheduler.fire_now(id).await
    }

    /// Validate a pipeline source and store it.
    pub async fn register_pipeline(
        &self,
        project_id: ProjectId,
        source: impl Into<String>,
    ) -> Result<StoredPipeline> {
        let source = source.into();
        let plan = strata_runner::parse(&source)?;

        let now = Utc::now();
        let pipeline = StoredPipeline {
            id: PipelineId::new(),
            project_id,
            name: plan.name().to_string(),
            source,
            created_at: now,
            updated_at: now,
        };
        self.pipelines.save(&pipeline).await?;

        info!(pipeline_id = %pipeline.id, name = %pipeline.name, "Pipeline registered");
        Ok(pipeline)
    }

    /// Enqueue a caller-built task.
    pub async fn enqueue_task(&self, mut task: WorkTask) -> Result<TaskId> {
        task.metadata
            .entry(meta::TRIGGER_TYPE.to_string())
            .or_insert_with(|| meta::TRIGGER_API.to_string());
        self.queue.enqueue(task).await
    }

    /// Enqueue one run of a stored pipeline.
    pub async fn execute_pipeline(
        &self,
        pipeline_id: PipelineId,
        parameters: HashMap<String, Value>,
        data_access: DataAccessSpec,
        priority: i32,
    ) -> Result<TaskId> {
        let pipeline = self
            .pipelines
            .get(pipeline_id)
            .await?
            .ok_or_else(|| Error::PipelineNotFound(pipeline_id.to_string()))?;

        let mut task = WorkTask::pipeline_execution(pipeline_id, pipeline.project_id)
            .with_priority(priority)
            .with_data_access(data_access);
        task.task_spec.parameters = parameters;

        self.enqueue_task(task).await
    }

    pub async fn get_task_status(&self, id: TaskId) -> Result<WorkTask> {
        self.queue
            .get(id)
            .await?
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    pub async fn cancel_task(&self, id: TaskId, reason: Option<String>) -> Result<CancelOutcome> {
        self.queue.cancel(id, reason).await
    }
}
