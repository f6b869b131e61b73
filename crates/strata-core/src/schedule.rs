//! Recurring schedule records and requests.

use crate::ids::{PipelineId, ProjectId, ScheduleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A recurring trigger mapping a cron expression to a set of pipelines.
///
/// `next_run` is `Some` exactly when `enabled` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub project_id: ProjectId,
    pub name: String,
    pub pipelines: Vec<PipelineId>,
    pub cron_schedule: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

/// Request to create a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSchedule {
    pub project_id: ProjectId,
    pub name: String,
    pub pipelines: Vec<PipelineId>,
    pub cron_schedule: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pipelines: Option<Vec<PipelineId>>,
    #[serde(default)]
    pub cron_schedule: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl ScheduleUpdate {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Default::default()
        }
    }

    pub fn cron(expr: impl Into<String>) -> Self {
        Self {
            cron_schedule: Some(expr.into()),
            ..Default::default()
        }
    }
}
