//! Remote store port
//!
//! The hosted table API is reached through [`LeaseStore`]. Besides the
//! row-level primitives, a store must provide [`LeaseStore::commit`]: a
//! single-row compare-and-swap that writes the lease row and the task
//! status together, so a failure can never leave one without the other.

pub mod memory;

pub use memory::InMemoryStore;

use crate::error::StoreError;
use crate::types::{
    ActorId, AuditEvent, Task, TaskId, TaskLease, TaskSnapshot, TaskStatus, TaskUpdate,
};
use async_trait::async_trait;

/// What a commit does to the lease row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseWrite {
    /// Leave the lease row as is
    Keep,
    /// Insert or replace the lease row
    Put(TaskLease),
    /// Remove the lease row
    Delete,
}

/// Atomic lease + task status write, guarded by the expected current state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseCommit {
    /// Target task
    pub task_id: TaskId,
    /// Lease row the decision was made against
    pub expected_lease: Option<TaskLease>,
    /// Status the decision was made against
    pub expected_status: TaskStatus,
    /// Lease row write
    pub lease: LeaseWrite,
    /// Task row write
    pub task: TaskUpdate,
}

/// Result of a [`LeaseCommit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Applied; state after the write
    Committed(TaskSnapshot),
    /// Guard failed; current state, nothing written
    Stale(TaskSnapshot),
    /// No such task row
    Missing,
}

/// Row-level access to tasks, leases and audit events
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Insert a new task row; an existing id is `StoreError::Rejected`
    async fn insert_task(&self, task: Task) -> Result<(), StoreError>;

    /// Read a task row
    async fn read_task(&self, task_id: &TaskId) -> Result<Option<Task>, StoreError>;

    /// Read the lease row for a task
    async fn read_lease(&self, task_id: &TaskId) -> Result<Option<TaskLease>, StoreError>;

    /// Read task and lease rows together
    async fn read_snapshot(&self, task_id: &TaskId) -> Result<Option<TaskSnapshot>, StoreError>;

    /// Insert or update the lease row keyed by task
    async fn upsert_lease(&self, lease: TaskLease) -> Result<TaskLease, StoreError>;

    /// Delete the lease row if `holder` matches; returns whether a row was removed
    async fn delete_lease(&self, task_id: &TaskId, holder: &ActorId) -> Result<bool, StoreError>;

    /// Write status and assignee of a task row
    async fn update_task_status(
        &self,
        task_id: &TaskId,
        update: TaskUpdate,
    ) -> Result<(), StoreError>;

    /// Append an audit event
    async fn append_event(&self, event: AuditEvent) -> Result<(), StoreError>;

    /// Audit events of a task in append order
    async fn list_events(&self, task_id: &TaskId) -> Result<Vec<AuditEvent>, StoreError>;

    /// Guarded lease + status write
    async fn commit(&self, commit: LeaseCommit) -> Result<CommitOutcome, StoreError>;
}
