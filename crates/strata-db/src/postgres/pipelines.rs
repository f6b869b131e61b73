//! PostgreSQL pipeline store.

use super::db_error;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use strata_core::pipeline::StoredPipeline;
use strata_core::ports::PipelineRepository;
use strata_core::{Error, PipelineId, ProjectId, Result};

const COLUMNS: &str = "id, project_id, name, source, created_at, updated_at";

pub struct PgPipelineRepository {
    pool: PgPool,
}

impl PgPipelineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_pipeline(r: &sqlx::postgres::PgRow) -> StoredPipeline {
        StoredPipeline {
            id: PipelineId::from_uuid(r.get::<uuid::Uuid, _>("id")),
            project_id: ProjectId::new(r.get::<String, _>("project_id")),
            name: r.get("name"),
            source: r.get("source"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }
    }
}

#[async_trait]
impl PipelineRepository for PgPipelineRepository {
    async fn save(&self, pipeline: &StoredPipeline) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO pipelines (id, project_id, name, source, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT (id) DO UPDATE SET
                   project_id = EXCLUDED.project_id,
                   name = EXCLUDED.name,
                   source = EXCLUDED.source,
                   updated_at = EXCLUDED.updated_at"#,
        )
        .bind(pipeline.id.as_uuid())
        .bind(pipeline.project_id.as_str())
        .bind(&pipeline.name)
        .bind(&pipeline.source)
        .bind(pipeline.created_at)
        .bind(pipeline.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get(&self, id: PipelineId) -> Result<Option<StoredPipeline>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM pipelines WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.as_ref().map(Self::row_to_pipeline))
    }

    async fn exists(&self, id: PipelineId) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM pipelines WHERE id = $1) AS found")
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.get("found"))
    }

    async fn list_by_project(&self, project_id: &ProjectId) -> Result<Vec<StoredPipeline>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM pipelines WHERE project_id = $1 ORDER BY name"
        ))
        .bind(project_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.iter().map(Self::row_to_pipeline).collect())
    }

    async fn delete(&self, id: PipelineId) -> Result<()> {
        let done = sqlx::query("DELETE FROM pipelines WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if done.rows_affected() == 0 {
            return Err(Error::PipelineNotFound(id.to_string()));
        }
        Ok(())
    }
}
