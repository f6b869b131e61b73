//! Work task types.

use crate::ids::{PipelineId, ProjectId, TaskId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Audit metadata keys attached to tasks.
pub mod meta {
    pub const TRIGGER_TYPE: &str = "trigger_type";
    pub const TRIGGERED_BY: &str = "triggered_by";
    pub const WORKER_ID: &str = "worker_id";
    pub const CANCEL_REASON: &str = "cancel_reason";

    pub const TRIGGER_SCHEDULED: &str = "scheduled";
    pub const TRIGGER_API: &str = "api";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    PipelineExecution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(TaskStatus::Queued),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(Error::Serialization(format!("unknown task status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub pipeline_id: PipelineId,
    pub project_id: ProjectId,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    /// CPU cores.
    pub cpu: f32,
    /// Memory in megabytes.
    pub memory: u64,
    #[serde(default)]
    pub gpu: bool,
}

impl Default for ResourceRequirements {
    fn default() -> Self {
        Self {
            cpu: 1.0,
            memory: 512,
            gpu: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataAccessSpec {
    #[serde(default)]
    pub input_datasets: Vec<String>,
    #[serde(default)]
    pub output_location: Option<String>,
}

/// Result metadata recorded on completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub location: Option<String>,
    pub steps_executed: usize,
    pub context_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkTask {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub priority: i32,
    pub submitted_at: DateTime<Utc>,
    pub project_id: ProjectId,
    pub task_spec: TaskSpec,
    #[serde(default)]
    pub resource_requirements: ResourceRequirements,
    #[serde(default)]
    pub data_access: DataAccessSpec,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub cancel_requested: bool,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<TaskResult>,
    #[serde(default)]
    pub error: Option<String>,
}

impl WorkTask {
    /// Build a queued pipeline execution task.
    pub fn pipeline_execution(pipeline_id: PipelineId, project_id: ProjectId) -> Self {
        Self {
            id: TaskId::new(),
            task_type: TaskType::PipelineExecution,
            status: TaskStatus::Queued,
            priority: 0,
            submitted_at: Utc::now(),
            project_id: project_id.clone(),
            task_spec: TaskSpec {
                pipeline_id,
                project_id,
                parameters: HashMap::new(),
            },
            resource_requirements: ResourceRequirements::default(),
            data_access: DataAccessSpec::default(),
            metadata: HashMap::new(),
            cancel_requested: false,
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.task_spec.parameters.insert(key.into(), value);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_data_access(mut self, data_access: DataAccessSpec) -> Self {
        self.data_access = data_access;
        self
    }

    pub fn with_resources(mut self, resources: ResourceRequirements) -> Self {
        self.resource_requirements = resources;
        self
    }

    /// Check the fields an enqueue requires.
    pub fn validate(&self) -> Result<()> {
        if self.project_id.as_str().trim().is_empty() {
            return Err(Error::Validation("task project id is empty".into()));
        }
        if self.task_spec.project_id != self.project_id {
            return Err(Error::Validation(format!(
                "task spec project {} does not match task project {}",
                self.task_spec.project_id, self.project_id
            )));
        }
        if self.resource_requirements.cpu <= 0.0 {
            return Err(Error::Validation("cpu requirement must be positive".into()));
        }
        if self.resource_requirements.memory == 0 {
            return Err(Error::Validation("memory requirement must be positive".into()));
        }
        Ok(())
    }
}

/// Outcome of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The task was still queued and is now cancelled.
    Cancelled,
    /// The task is running; the worker observes the request at the next step boundary.
    Requested,
}
