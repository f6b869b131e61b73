//! Status transition rules shared by the queue adapters.

use strata_core::task::TaskStatus;
use strata_core::{Error, Result, TaskId};

/// Check that a task in `status` may move to `to`, one of the states a
/// running task finishes in.
pub(crate) fn check_finish(id: TaskId, status: TaskStatus, to: TaskStatus) -> Result<()> {
    match status {
        TaskStatus::Running => Ok(()),
        s if s.is_terminal() => Err(Error::TaskTerminal {
            id: id.to_string(),
            status: s.to_string(),
        }),
        s => Err(Error::InvalidTransition {
            id: id.to_string(),
            from: s.to_string(),
            to: to.to_string(),
        }),
    }
}

/// Error for a claim on a task that is no longer queued.
pub(crate) fn claim_conflict(id: TaskId, status: TaskStatus) -> Error {
    Error::ClaimConflict(format!("{id} is {status}"))
}
