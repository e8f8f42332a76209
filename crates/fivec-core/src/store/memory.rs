//! In-memory store
//!
//! One `DashMap` entry per task holds both the task row and its lease row.
//! Every write goes through the entry's shard lock, which gives the
//! single-row atomicity [`LeaseStore::commit`] requires.

use super::{CommitOutcome, LeaseCommit, LeaseStore, LeaseWrite};
use crate::error::StoreError;
use crate::types::{ActorId, AuditEvent, Task, TaskId, TaskLease, TaskSnapshot, TaskUpdate};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

#[derive(Debug, Clone)]
struct TaskRow {
    task: Task,
    lease: Option<TaskLease>,
}

impl TaskRow {
    fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            task: self.task.clone(),
            lease: self.lease.clone(),
        }
    }
}

/// Process-local [`LeaseStore`]
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rows: DashMap<TaskId, TaskRow>,
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store seeded with `tasks`
    #[must_use]
    pub fn with_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let store = Self::new();
        for task in tasks {
            store.rows.insert(task.id.clone(), TaskRow { task, lease: None });
        }
        store
    }

    /// Number of task rows
    #[inline]
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of audit events across all tasks
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

#[async_trait]
impl LeaseStore for InMemoryStore {
    async fn insert_task(&self, task: Task) -> Result<(), StoreError> {
        match self.rows.entry(task.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Rejected(format!(
                "task {} already exists",
                task.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(TaskRow { task, lease: None });
                Ok(())
            }
        }
    }

    async fn read_task(&self, task_id: &TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.rows.get(task_id).map(|row| row.task.clone()))
    }

    async fn read_lease(&self, task_id: &TaskId) -> Result<Option<TaskLease>, StoreError> {
        Ok(self.rows.get(task_id).and_then(|row| row.lease.clone()))
    }

    async fn read_snapshot(&self, task_id: &TaskId) -> Result<Option<TaskSnapshot>, StoreError> {
        Ok(self.rows.get(task_id).map(|row| row.snapshot()))
    }

    async fn upsert_lease(&self, lease: TaskLease) -> Result<TaskLease, StoreError> {
        let mut row = self
            .rows
            .get_mut(&lease.task_id)
            .ok_or_else(|| StoreError::Rejected(format!("no task row for {}", lease.task_id)))?;
        row.lease = Some(lease.clone());
        Ok(lease)
    }

    async fn delete_lease(&self, task_id: &TaskId, holder: &ActorId) -> Result<bool, StoreError> {
        let Some(mut row) = self.rows.get_mut(task_id) else {
            return Ok(false);
        };
        if row.lease.as_ref().is_some_and(|l| l.is_held_by(holder)) {
            row.lease = None;
            return Ok(true);
        }
        Ok(false)
    }

    async fn update_task_status(
        &self,
        task_id: &TaskId,
        update: TaskUpdate,
    ) -> Result<(), StoreError> {
        let mut row = self
            .rows
            .get_mut(task_id)
            .ok_or_else(|| StoreError::Rejected(format!("no task row for {task_id}")))?;
        row.task.apply(&update);
        Ok(())
    }

    async fn append_event(&self, event: AuditEvent) -> Result<(), StoreError> {
        self.events.lock().push(event);
        Ok(())
    }

    async fn list_events(&self, task_id: &TaskId) -> Result<Vec<AuditEvent>, StoreError> {
        Ok(self
            .events
            .lock()
            .iter()
            .filter(|e| &e.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn commit(&self, commit: LeaseCommit) -> Result<CommitOutcome, StoreError> {
        let Some(mut row) = self.rows.get_mut(&commit.task_id) else {
            return Ok(CommitOutcome::Missing);
        };

        if row.lease != commit.expected_lease || row.task.status != commit.expected_status {
            return Ok(CommitOutcome::Stale(row.snapshot()));
        }

        match commit.lease {
            LeaseWrite::Keep => {}
            LeaseWrite::Put(lease) => row.lease = Some(lease),
            LeaseWrite::Delete => row.lease = None,
        }
        row.task.apply(&commit.task);

        Ok(CommitOutcome::Committed(row.snapshot()))
    }
}
