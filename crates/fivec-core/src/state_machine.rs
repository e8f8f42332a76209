//! Task status transitions
//!
//! The status field moves together with the lease:
//! `open → claimed → active → done | blocked`, with release returning a
//! claimed or active task to `open` and reopen returning a blocked one.

use crate::error::LeaseError;
use crate::types::{TaskId, TaskStatus};

/// Statuses reachable from `from`
#[must_use]
pub fn allowed_transitions(from: TaskStatus) -> &'static [TaskStatus] {
    match from {
        TaskStatus::Open => &[TaskStatus::Claimed],
        TaskStatus::Claimed => &[
            TaskStatus::Claimed,
            TaskStatus::Active,
            TaskStatus::Open,
            TaskStatus::Blocked,
        ],
        TaskStatus::Active => &[
            TaskStatus::Claimed,
            TaskStatus::Done,
            TaskStatus::Blocked,
            TaskStatus::Open,
        ],
        TaskStatus::Blocked => &[TaskStatus::Open],
        TaskStatus::Done => &[],
    }
}

/// Validates a status transition for `task_id`.
///
/// # Errors
/// - `LeaseError::InvalidTransition` if `to` is not reachable from `from`
pub fn validate_transition(
    task_id: &TaskId,
    from: TaskStatus,
    to: TaskStatus,
) -> Result<(), LeaseError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(LeaseError::InvalidTransition {
            task_id: task_id.clone(),
            from,
            to,
        })
    }
}
