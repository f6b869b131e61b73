//! Integration test infrastructure for Strata.
//!
//! Starts a throwaway PostgreSQL container so the `sqlx` adapters can be
//! exercised against a real database.
//!
//! ```ignore
//! use strata_tests::TestContext;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let ctx = TestContext::start().await.unwrap();
//!     let queue = ctx.db.task_queue();
//! }
//! ```

pub mod containers;
pub mod context;
pub mod fixtures;

pub use context::TestContext;
pub use fixtures::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,strata_tests=debug")),
        )
        .with_test_writer()
        .try_init();
}
