//! Sample records for integration tests.

use chrono::Utc;
use strata_core::pipeline::StoredPipeline;
use strata_core::schedule::Schedule;
use strata_core::task::WorkTask;
use strata_core::{PipelineId, ProjectId, ScheduleId};

pub const PROJECT: &str = "integration";

/// Three context steps that always succeed.
pub const COUNTING_PIPELINE: &str = r#"
name: counting
type: processing
steps:
  - name: tick
    plugin: control/counter
    control:
      if: "${{ tick }} < 3"
      then: tick
  - name: total
    plugin: context/get
    config: { path: tick }
"#;

pub struct PipelineFixture;

impl PipelineFixture {
    pub fn counting() -> StoredPipeline {
        Self::with_source("counting", COUNTING_PIPELINE)
    }

    pub fn with_source(name: &str, source: &str) -> StoredPipeline {
        let now = Utc::now();
        StoredPipeline {
            id: PipelineId::new(),
            project_id: ProjectId::new(PROJECT),
            name: name.to_string(),
            source: source.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

pub struct TaskFixture;

impl TaskFixture {
    pub fn for_pipeline(pipeline_id: PipelineId) -> WorkTask {
        WorkTask::pipeline_execution(pipeline_id, ProjectId::new(PROJECT))
    }
}

pub struct ScheduleFixture;

impl ScheduleFixture {
    pub fn hourly(pipelines: Vec<PipelineId>) -> Schedule {
        let now = Utc::now();
        Schedule {
            id: ScheduleId::new(),
            project_id: ProjectId::new(PROJECT),
            name: "hourly".to_string(),
            pipelines,
            cron_schedule: "0 * * * *".to_string(),
            enabled: true,
            created_at: now,
            updated_at: now,
            last_run: None,
            next_run: Some(now),
        }
    }
}
