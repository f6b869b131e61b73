//! Schedule registry.
//!
//! Keeps persisted schedules and live triggers consistent. Requests are
//! validated in full before anything is changed.

use crate::scheduler::Scheduler;
use crate::trigger::TriggerExpression;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use strata_core::ports::{PipelineRepository, ScheduleRepository};
use strata_core::schedule::{NewSchedule, Schedule, ScheduleUpdate};
use strata_core::{Error, PipelineId, ProjectId, Result, ScheduleId};
use tracing::{info, warn};

pub struct ScheduleRegistry {
    schedules: Arc<dyn ScheduleRepository>,
    pipelines: Arc<dyn PipelineRepository>,
    scheduler: Arc<Scheduler>,
}

impl ScheduleRegistry {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        pipelines: Arc<dyn PipelineRepository>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            schedules,
            pipelines,
            scheduler,
        }
    }

    pub async fn create(&self, request: NewSchedule) -> Result<Schedule> {
        let name = validate_name(&request.name)?;
        self.validate_pipelines(&request.pipelines).await?;
        let expression = TriggerExpression::parse(&request.cron_schedule)?;

        let now = Utc::now();
        let next_run = if request.enabled {
            Some(upcoming(&expression, now)?)
        } else {
            None
        };
        let schedule = Schedule {
            id: ScheduleId::new(),
            project_id: request.project_id,
            name,
            pipelines: request.pipelines,
            cron_schedule: expression.as_str().to_string(),
            enabled: request.enabled,
            created_at: now,
            updated_at: now,
            last_run: None,
            next_run,
        };

        self.schedules.save(&schedule).await?;
        if schedule.enabled {
            self.scheduler.register(&schedule).await?;
        }

        info!(schedule_id = %schedule.id, name = %schedule.name, "Schedule created");
        Ok(schedule)
    }

    pub async fn update(&self, id: ScheduleId, update: ScheduleUpdate) -> Result<Schedule> {
        let mut schedule = self.get(id).await?;

        let name = update.name.as_deref().map(validate_name).transpose()?;
        if let Some(pipelines) = &update.pipelines {
            self.validate_pipelines(pipelines).await?;
        }
        let new_expression = update
            .cron_schedule
            .as_deref()
            .map(TriggerExpression::parse)
            .transpose()?;
        let expression = match new_expression {
            Some(expr) => expr,
            None => TriggerExpression::parse(&schedule.cron_schedule)?,
        };

        let enabled = update.enabled.unwrap_or(schedule.enabled);
        let now = Utc::now();
        let next_fire = if enabled {
            Some(upcoming(&expression, now)?)
        } else {
            None
        };

        self.scheduler.unregister(id).await;
        let previous = schedule.clone();

        let trigger_changed = update
            .cron_schedule
            .as_deref()
            .is_some_and(|c| c.trim() != schedule.cron_schedule);
        let enabled_changed = update.enabled.is_some_and(|e| e != schedule.enabled);

        if let Some(name) = name {
            schedule.name = name;
        }
        if let Some(pipelines) = update.pipelines {
            schedule.pipelines = pipelines;
        }
        schedule.cron_schedule = expression.as_str().to_string();
        schedule.enabled = enabled;
        schedule.updated_at = now;
        if !enabled || trigger_changed || enabled_changed || schedule.next_run.is_none() {
            schedule.next_run = next_fire;
        }

        if let Err(e) = self.schedules.save(&schedule).await {
            if let Err(restore) = self.scheduler.register(&previous).await {
                warn!(schedule_id = %id, error = %restore, "Failed to restore trigger");
            }
            return Err(e);
        }
        if schedule.enabled {
            self.scheduler.register(&schedule).await?;
        }

        info!(schedule_id = %id, enabled = schedule.enabled, "Schedule updated");
        Ok(schedule)
    }

    pub async fn delete(&self, id: ScheduleId) -> Result<()> {
        self.scheduler.unregister(id).await;
        self.schedules.delete(id).await?;
        info!(schedule_id = %id, "Schedule deleted");
        Ok(())
    }

    pub async fn get(&self, id: ScheduleId) -> Result<Schedule> {
        self.schedules
            .get(id)
            .await?
            .ok_or_else(|| Error::ScheduleNotFound(id.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<Schedule>> {
        self.schedules.list().await
    }

    pub async fn list_by_project(&self, project_id: &ProjectId) -> Result<Vec<Schedule>> {
        self.schedules.list_by_project(project_id).await
    }

    async fn validate_pipelines(&self, pipelines: &[PipelineId]) -> Result<()> {
        if pipelines.is_empty() {
            return Err(Error::Validation(
                "schedule needs at least one pipeline".into(),
            ));
        }
        let mut seen = HashSet::with_capacity(pipelines.len());
        for &id in pipelines {
            if !seen.insert(id) {
                return Err(Error::Validation(format!("pipeline {id} is listed twice")));
            }
            if !self.pipelines.exists(id).await? {
                return Err(Error::PipelineNotFound(id.to_string()));
            }
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation("schedule name is empty".into()));
    }
    Ok(name.to_string())
}

/// Next firing after `now`; an enabled schedule must have one.
fn upcoming(expression: &TriggerExpression, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    expression.next_after(now).ok_or_else(|| {
        Error::Validation(format!(
            "trigger expression '{}' has no future firing",
            expression.as_str()
        ))
    })
}
