//! PostgreSQL adapters.

mod pipelines;
mod queue;
mod schedules;

pub use pipelines::PgPipelineRepository;
pub use queue::PgTaskQueue;
pub use schedules::PgScheduleRepository;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use strata_core::{Error, Result};
use tracing::info;

/// Database connection pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to the database.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with(database_url, 20).await
    }

    /// Connect with an explicit pool size.
    pub async fn connect_with(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(db_error)?;

        info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run embedded migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    pub fn task_queue(&self) -> PgTaskQueue {
        PgTaskQueue::new(self.pool.clone())
    }

    pub fn schedules(&self) -> PgScheduleRepository {
        PgScheduleRepository::new(self.pool.clone())
    }

    pub fn pipelines(&self) -> PgPipelineRepository {
        PgPipelineRepository::new(self.pool.clone())
    }
}

pub(crate) fn db_error(err: sqlx::Error) -> Error {
    Error::Database(err.to_string())
}
