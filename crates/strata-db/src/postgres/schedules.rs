//! PostgreSQL schedule repository.

use super::db_error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use strata_core::ports::ScheduleRepository;
use strata_core::schedule::Schedule;
use strata_core::{Error, PipelineId, ProjectId, Result, ScheduleId};

const COLUMNS: &str = "id, project_id, name, pipelines, cron_schedule, enabled, created_at, updated_at, last_run, next_run";

pub struct PgScheduleRepository {
    pool: PgPool,
}

impl PgScheduleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_schedule(r: &sqlx::postgres::PgRow) -> Result<Schedule> {
        let pipelines: Vec<PipelineId> = serde_json::from_value(r.get("pipelines"))?;
        Ok(Schedule {
            id: ScheduleId::from_uuid(r.get::<uuid::Uuid, _>("id")),
            project_id: ProjectId::new(r.get::<String, _>("project_id")),
            name: r.get("name"),
            pipelines,
            cron_schedule: r.get("cron_schedule"),
            enabled: r.get("enabled"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
            last_run: r.get("last_run"),
            next_run: r.get("next_run"),
        })
    }
}

#[async_trait]
impl ScheduleRepository for PgScheduleRepository {
    async fn save(&self, schedule: &Schedule) -> Result<()> {
        let pipelines = serde_json::to_value(&schedule.pipelines)?;
        sqlx::query(
            r#"INSERT INTO schedules (id, project_id, name, pipelines, cron_schedule, enabled, created_at, updated_at, last_run, next_run)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
               ON CONFLICT (id) DO UPDATE SET
                   name = EXCLUDED.name,
                   pipelines = EXCLUDED.pipelines,
                   cron_schedule = EXCLUDED.cron_schedule,
                   enabled = EXCLUDED.enabled,
                   updated_at = EXCLUDED.updated_at,
                   last_run = EXCLUDED.last_run,
                   next_run = EXCLUDED.next_run"#,
        )
        .bind(schedule.id.as_uuid())
        .bind(schedule.project_id.as_str())
        .bind(&schedule.name)
        .bind(&pipelines)
        .bind(&schedule.cron_schedule)
        .bind(schedule.enabled)
        .bind(schedule.created_at)
        .bind(schedule.updated_at)
        .bind(schedule.last_run)
        .bind(schedule.next_run)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get(&self, id: ScheduleId) -> Result<Option<Schedule>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM schedules WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref().map(Self::row_to_schedule).transpose()
    }

    async fn list(&self) -> Result<Vec<Schedule>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM schedules ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(Self::row_to_schedule).collect()
    }

    async fn list_by_project(&self, project_id: &ProjectId) -> Result<Vec<Schedule>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM schedules WHERE project_id = $1 ORDER BY created_at, id"
        ))
        .bind(project_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(Self::row_to_schedule).collect()
    }

    async fn delete(&self, id: ScheduleId) -> Result<()> {
        let done = sqlx::query("DELETE FROM schedules WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if done.rows_affected() == 0 {
            return Err(Error::ScheduleNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn record_run(
        &self,
        id: ScheduleId,
        cron_schedule: &str,
        last_run: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<Option<Schedule>> {
        let row = sqlx::query(&format!(
            r#"UPDATE schedules SET
                   last_run = $2,
                   next_run = CASE WHEN enabled AND cron_schedule = $3 THEN $4 ELSE next_run END
               WHERE id = $1
               RETURNING {COLUMNS}"#
        ))
        .bind(id.as_uuid())
        .bind(last_run)
        .bind(cron_schedule)
        .bind(next_run)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        row.as_ref().map(Self::row_to_schedule).transpose()
    }
}
