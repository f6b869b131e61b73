//! Test context bundling a running database and a migrated pool.

use crate::containers::PostgresContainer;
use strata_db::Database;

/// Drop this to stop the container.
pub struct TestContext {
    pub postgres: PostgresContainer,
    pub db: Database,
}

impl TestContext {
    pub async fn start() -> anyhow::Result<Self> {
        crate::init_test_logging();

        let postgres = PostgresContainer::start().await?;
        let db = Database::connect(postgres.connection_string()).await?;
        db.migrate().await?;

        Ok(Self { postgres, db })
    }

    pub fn db_url(&self) -> &str {
        self.postgres.connection_string()
    }
}
