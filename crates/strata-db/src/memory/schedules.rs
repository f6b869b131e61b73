//! In-memory schedule repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use strata_core::ports::ScheduleRepository;
use strata_core::schedule::Schedule;
use strata_core::{Error, ProjectId, Result, ScheduleId};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryScheduleRepository {
    schedules: RwLock<HashMap<ScheduleId, Schedule>>,
}

impl MemoryScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted(mut schedules: Vec<Schedule>) -> Vec<Schedule> {
    schedules.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    schedules
}

#[async_trait]
impl ScheduleRepository for MemoryScheduleRepository {
    async fn save(&self, schedule: &Schedule) -> Result<()> {
        self.schedules
            .write()
            .await
            .insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn get(&self, id: ScheduleId) -> Result<Option<Schedule>> {
        Ok(self.schedules.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Schedule>> {
        Ok(sorted(self.schedules.read().await.values().cloned().collect()))
    }

    async fn list_by_project(&self, project_id: &ProjectId) -> Result<Vec<Schedule>> {
        Ok(sorted(
            self.schedules
                .read()
                .await
                .values()
                .filter(|s| &s.project_id == project_id)
                .cloned()
                .collect(),
        ))
    }

    async fn delete(&self, id: ScheduleId) -> Result<()> {
        self.schedules
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::ScheduleNotFound(id.to_string()))
    }

    async fn record_run(
        &self,
        id: ScheduleId,
        cron_schedule: &str,
        last_run: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<Option<Schedule>> {
        let mut schedules = self.schedules.write().await;
        let Some(schedule) = schedules.get_mut(&id) else {
            return Ok(None);
        };
        schedule.last_run = Some(last_run);
        if schedule.enabled && schedule.cron_schedule == cron_schedule {
            schedule.next_run = next_run;
        }
        Ok(Some(schedule.clone()))
    }
}
