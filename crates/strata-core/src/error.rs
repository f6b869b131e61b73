//! Error types for Strata.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Request validation
    #[error("Validation failed: {0}")]
    Validation(String),

    // Lookup failures
    #[error("Schedule not found: {0}")]
    ScheduleNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Plugin execution failed: {0}")]
    PluginFailed(String),

    // Pipeline source errors
    #[error("Pipeline parse error: {0}")]
    Parse(String),

    // Plugin configuration
    #[error("Invalid config for plugin {plugin}: {reason}")]
    ConfigInvalid { plugin: String, reason: String },

    // Execution
    #[error("Step '{step}' (#{index}) failed: {cause}")]
    Execution {
        step: String,
        index: usize,
        cause: String,
    },

    #[error("Context window limit exceeded: {0}")]
    ContextLimitExceeded(String),

    // Queue state machine
    #[error("Task {0} was claimed by another worker")]
    ClaimConflict(String),

    #[error("Task {id} is already {status}")]
    TaskTerminal { id: String, status: String },

    #[error("Task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    // Infrastructure errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for the NotFound family.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ScheduleNotFound(_)
                | Error::TaskNotFound(_)
                | Error::PipelineNotFound(_)
                | Error::PluginNotFound(_)
        )
    }

    /// True when a claim lost the race against another claimant.
    pub fn is_claim_conflict(&self) -> bool {
        matches!(self, Error::ClaimConflict(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
