//! PostgreSQL work queue.
//!
//! Claims use `FOR UPDATE SKIP LOCKED` and every status change is a
//! compare-and-set on the current status, so concurrent workers on separate
//! connections never both win a task.

use super::db_error;
use crate::transition::{check_finish, claim_conflict};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use strata_core::ports::TaskQueue;
use strata_core::task::{CancelOutcome, TaskResult, TaskStatus, TaskType, WorkTask, meta};
use strata_core::{Error, ProjectId, Result, TaskId};
use tracing::{debug, info};

const COLUMNS: &str = "id, task_type, status, priority, submitted_at, project_id, task_spec, \
     resource_requirements, data_access, metadata, cancel_requested, started_at, finished_at, \
     result, error";

pub struct PgTaskQueue {
    pool: PgPool,
}

impl PgTaskQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn type_to_str(task_type: TaskType) -> &'static str {
        match task_type {
            TaskType::PipelineExecution => "pipeline_execution",
        }
    }

    fn str_to_type(s: &str) -> Result<TaskType> {
        match s {
            "pipeline_execution" => Ok(TaskType::PipelineExecution),
            other => Err(Error::Serialization(format!("unknown task type: {other}"))),
        }
    }

    fn row_to_task(r: &sqlx::postgres::PgRow) -> Result<WorkTask> {
        let status: String = r.get("status");
        let task_type: String = r.get("task_type");
        let result: Option<Value> = r.get("result");

        Ok(WorkTask {
            id: TaskId::from_uuid(r.get::<uuid::Uuid, _>("id")),
            task_type: Self::str_to_type(&task_type)?,
            status: status.parse()?,
            priority: r.get("priority"),
            submitted_at: r.get("submitted_at"),
            project_id: ProjectId::new(r.get::<String, _>("project_id")),
            task_spec: serde_json::from_value(r.get("task_spec"))?,
            resource_requirements: serde_json::from_value(r.get("resource_requirements"))?,
            data_access: serde_json::from_value(r.get("data_access"))?,
            metadata: serde_json::from_value::<HashMap<String, String>>(r.get("metadata"))?,
            cancel_requested: r.get("cancel_requested"),
            started_at: r.get("started_at"),
            finished_at: r.get("finished_at"),
            result: result.map(serde_json::from_value).transpose()?,
            error: r.get("error"),
        })
    }

    async fn status_of(&self, id: TaskId) -> Result<TaskStatus> {
        let row = sqlx::query("SELECT status FROM tasks WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        row.get::<String, _>("status").parse()
    }

    /// Explain why a compare-and-set from `running` touched no row.
    async fn finish_rejected(&self, id: TaskId, to: TaskStatus) -> Error {
        match self.status_of(id).await {
            Ok(status) => match check_finish(id, status, to) {
                Err(e) => e,
                // Finished concurrently between the update and this read.
                Ok(()) => Error::ClaimConflict(id.to_string()),
            },
            Err(e) => e,
        }
    }
}

#[async_trait]
impl TaskQueue for PgTaskQueue {
    async fn enqueue(&self, task: WorkTask) -> Result<TaskId> {
        task.validate()?;

        let done = sqlx::query(
            r#"INSERT INTO tasks (id, task_type, status, priority, submitted_at, project_id, task_spec,
                                  resource_requirements, data_access, metadata, cancel_requested)
               VALUES ($1, $2, 'queued', $3, $4, $5, $6, $7, $8, $9, FALSE)
               ON CONFLICT (id) DO NOTHING"#,
        )
        .bind(task.id.as_uuid())
        .bind(Self::type_to_str(task.task_type))
        .bind(task.priority)
        .bind(task.submitted_at)
        .bind(task.project_id.as_str())
        .bind(serde_json::to_value(&task.task_spec)?)
        .bind(serde_json::to_value(&task.resource_requirements)?)
        .bind(serde_json::to_value(&task.data_access)?)
        .bind(serde_json::to_value(&task.metadata)?)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if done.rows_affected() == 0 {
            return Err(Error::Validation(format!("task {} already exists", task.id)));
        }
        debug!(task_id = %task.id, "Task enqueued");
        Ok(task.id)
    }

    async fn claim(&self) -> Result<Option<WorkTask>> {
        let row = sqlx::query(&format!(
            r#"UPDATE tasks SET status = 'running', started_at = $1
               WHERE id = (
                   SELECT id FROM tasks
                   WHERE status = 'queued'
                   ORDER BY priority DESC, submitted_at ASC
                   LIMIT 1
                   FOR UPDATE SKIP LOCKED
               )
               RETURNING {COLUMNS}"#
        ))
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn claim_task(&self, id: TaskId) -> Result<WorkTask> {
        let row = sqlx::query(&format!(
            "UPDATE tasks SET status = 'running', started_at = $2 \
             WHERE id = $1 AND status = 'queued' RETURNING {COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        match row {
            Some(r) => Self::row_to_task(&r),
            None => Err(claim_conflict(id, self.status_of(id).await?)),
        }
    }

    async fn complete(&self, id: TaskId, result: TaskResult) -> Result<()> {
        let done = sqlx::query(
            "UPDATE tasks SET status = 'completed', result = $2, finished_at = $3 \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id.as_uuid())
        .bind(serde_json::to_value(&result)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if done.rows_affected() == 0 {
            return Err(self.finish_rejected(id, TaskStatus::Completed).await);
        }
        Ok(())
    }

    async fn fail(&self, id: TaskId, error: String) -> Result<()> {
        let done = sqlx::query(
            "UPDATE tasks SET status = 'failed', error = $2, finished_at = $3 \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id.as_uuid())
        .bind(&error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if done.rows_affected() == 0 {
            return Err(self.finish_rejected(id, TaskStatus::Failed).await);
        }
        Ok(())
    }

    async fn cancel(&self, id: TaskId, reason: Option<String>) -> Result<CancelOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let row = sqlx::query("SELECT status FROM tasks WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        let status: TaskStatus = row.get::<String, _>("status").parse()?;

        let outcome = match status {
            TaskStatus::Queued => {
                sqlx::query(
                    "UPDATE tasks SET status = 'cancelled', finished_at = $2 WHERE id = $1",
                )
                .bind(id.as_uuid())
                .bind(Utc::now())
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
                CancelOutcome::Cancelled
            }
            TaskStatus::Running => {
                sqlx::query("UPDATE tasks SET cancel_requested = TRUE WHERE id = $1")
                    .bind(id.as_uuid())
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error)?;
                CancelOutcome::Requested
            }
            status => {
                return Err(Error::TaskTerminal {
                    id: id.to_string(),
                    status: status.to_string(),
                });
            }
        };

        if let Some(reason) = reason {
            sqlx::query(
                "UPDATE tasks SET metadata = metadata || jsonb_build_object($2::text, $3::text) \
                 WHERE id = $1",
            )
            .bind(id.as_uuid())
            .bind(meta::CANCEL_REASON)
            .bind(reason)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        tx.commit().await.map_err(db_error)?;
        info!(task_id = %id, ?outcome, "Task cancellation recorded");
        Ok(outcome)
    }

    async fn mark_cancelled(&self, id: TaskId, detail: Option<String>) -> Result<()> {
        let done = sqlx::query(
            "UPDATE tasks SET status = 'cancelled', error = $2, finished_at = $3 \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id.as_uuid())
        .bind(detail)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if done.rows_affected() == 0 {
            return Err(self.finish_rejected(id, TaskStatus::Cancelled).await);
        }
        Ok(())
    }

    async fn annotate(&self, id: TaskId, key: &str, value: &str) -> Result<()> {
        let done = sqlx::query(
            "UPDATE tasks SET metadata = metadata || jsonb_build_object($2::text, $3::text) \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if done.rows_affected() == 0 {
            return Err(Error::TaskNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<WorkTask>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn list(&self, status: Option<TaskStatus>, limit: usize) -> Result<Vec<WorkTask>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM tasks WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY submitted_at DESC, id DESC LIMIT $2"
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(Self::row_to_task).collect()
    }
}
