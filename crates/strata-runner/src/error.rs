//! Step-scoped execution errors.

use thiserror::Error;

/// Why a run stopped. Every variant names the step it stopped at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("step '{step}' (#{index}): plugin {plugin} is not registered")]
    PluginNotFound {
        step: String,
        index: usize,
        plugin: String,
    },

    #[error("step '{step}' (#{index}): invalid config: {reason}")]
    ConfigInvalid {
        step: String,
        index: usize,
        reason: String,
    },

    #[error("step '{step}' (#{index}) failed: {cause}")]
    StepFailed {
        step: String,
        index: usize,
        cause: String,
    },

    #[error("iteration ceiling of {limit} steps reached before step '{step}' (#{index})")]
    BoundedLoopExceeded {
        step: String,
        index: usize,
        limit: usize,
    },

    #[error("step '{step}' (#{index}) requested a jump to unknown step '{target}'")]
    JumpTargetUnknown {
        step: String,
        index: usize,
        target: String,
    },

    #[error("step '{step}' (#{index}): {reason}")]
    ContextLimit {
        step: String,
        index: usize,
        reason: String,
    },

    #[error("run cancelled before step '{step}' (#{index})")]
    Cancelled { step: String, index: usize },

    #[error("run timed out at step '{step}' (#{index})")]
    TimedOut { step: String, index: usize },
}

impl ExecutionError {
    pub fn step(&self) -> &str {
        match self {
            Self::PluginNotFound { step, .. }
            | Self::ConfigInvalid { step, .. }
            | Self::StepFailed { step, .. }
            | Self::BoundedLoopExceeded { step, .. }
            | Self::JumpTargetUnknown { step, .. }
            | Self::ContextLimit { step, .. }
            | Self::Cancelled { step, .. }
            | Self::TimedOut { step, .. } => step,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Self::PluginNotFound { index, .. }
            | Self::ConfigInvalid { index, .. }
            | Self::StepFailed { index, .. }
            | Self::BoundedLoopExceeded { index, .. }
            | Self::JumpTargetUnknown { index, .. }
            | Self::ContextLimit { index, .. }
            | Self::Cancelled { index, .. }
            | Self::TimedOut { index, .. } => *index,
        }
    }

    /// Root cause without the step prefix.
    pub fn cause(&self) -> String {
        match self {
            Self::PluginNotFound { plugin, .. } => format!("plugin {plugin} is not registered"),
            Self::ConfigInvalid { reason, .. } => format!("invalid config: {reason}"),
            Self::StepFailed { cause, .. } => cause.clone(),
            Self::BoundedLoopExceeded { limit, .. } => {
                format!("iteration ceiling of {limit} steps reached")
            }
            Self::JumpTargetUnknown { target, .. } => format!("unknown jump target '{target}'"),
            Self::ContextLimit { reason, .. } => reason.clone(),
            Self::Cancelled { .. } => "cancelled".to_string(),
            Self::TimedOut { .. } => "run timed out".to_string(),
        }
    }

    /// Errors an `on_error` directive may recover from. Everything else
    /// always aborts the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ConfigInvalid { .. } | Self::StepFailed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<ExecutionError> for strata_core::Error {
    fn from(err: ExecutionError) -> Self {
        strata_core::Error::Execution {
            step: err.step().to_string(),
            index: err.index(),
            cause: err.cause(),
        }
    }
}
