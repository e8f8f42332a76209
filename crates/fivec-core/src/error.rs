//! Error types for the lease manager
//!
//! Keeps logical outcomes and transport failures apart:
//! - Lease conflicts (`AlreadyLocked`, `NotHolder`) are expected and recoverable
//! - Lookup and lifecycle errors (`TaskNotFound`, `TaskClosed`, `InvalidTransition`)
//! - Store failures surface as `StoreUnavailable` and never as a conflict

use crate::types::{ActorId, TaskId, TaskStatus};

/// Main lease manager error type
#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
    /// A live lease is held by another actor
    #[error("task {task_id} is claimed by {holder}")]
    AlreadyLocked {
        /// Task ID
        task_id: TaskId,
        /// Current holder
        holder: ActorId,
    },

    /// Caller does not hold the lease
    #[error("{actor} does not hold the lease on task {task_id}")]
    NotHolder {
        /// Task ID
        task_id: TaskId,
        /// Caller
        actor: ActorId,
    },

    /// Task does not exist
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// Task id is already registered
    #[error("task already exists: {0}")]
    TaskExists(TaskId),

    /// Task is done and cannot be claimed
    #[error("task is closed: {0}")]
    TaskClosed(TaskId),

    /// Status change not allowed from the current status
    #[error("task {task_id}: cannot move from {from} to {to}")]
    InvalidTransition {
        /// Task ID
        task_id: TaskId,
        /// Current status
        from: TaskStatus,
        /// Requested status
        to: TaskStatus,
    },

    /// Concurrent writers kept invalidating the snapshot
    #[error("task {0} is contended, retry later")]
    Contended(TaskId),

    /// Lease end does not fit in a timestamp
    #[error("lease expiry for task {0} is out of range")]
    ExpiryOutOfRange(TaskId),

    /// No current actor available
    #[error("no authenticated actor")]
    Unauthenticated,

    /// Manager or watcher settings out of range
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    /// Backing store failed
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl LeaseError {
    /// Check if error is an expected lease conflict
    #[inline]
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyLocked { .. } | Self::NotHolder { .. })
    }

    /// Check if error came from the transport/store layer
    #[inline]
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Check if retrying later may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AlreadyLocked { .. } | Self::Contended(_) | Self::StoreUnavailable(_)
        )
    }

    /// Short notice suitable for a toast
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::AlreadyLocked { holder, .. } => {
                format!("This task is claimed by another user ({holder}).")
            }
            Self::NotHolder { .. } => "You no longer hold this task.".to_string(),
            Self::TaskNotFound(_) => "This task no longer exists.".to_string(),
            Self::TaskExists(_) => "A task with this id already exists.".to_string(),
            Self::TaskClosed(_) => "This task is already done.".to_string(),
            Self::InvalidTransition { from, to, .. } => {
                format!("A {from} task cannot be moved to {to}.")
            }
            Self::Unauthenticated => "Sign in to claim tasks.".to_string(),
            Self::Contended(_)
            | Self::ExpiryOutOfRange(_)
            | Self::InvalidConfig(_)
            | Self::StoreUnavailable(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }
}

/// Store transport errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Backend unreachable or rejected the request
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Request timed out
    #[error("request timed out after {after_ms}ms")]
    Timeout {
        /// Elapsed time
        after_ms: u64,
    },

    /// Backend refused the write (constraint violation)
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for [`crate::LeaseConfig`]
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Actor identifier errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ActorError {
    /// Blank identifier
    #[error("actor id must not be empty")]
    Empty,
}
