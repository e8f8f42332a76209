//! Testing utilities for the lease manager
//!
//! Shared fixtures, a manual-clock environment and a fault-injecting store.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use fivec_core::{
    ActorId, AuditEvent, CommitOutcome, InMemoryStore, LeaseCommit, LeaseConfig, LeaseStore,
    ManualClock, StoreError, Task, TaskId, TaskLease, TaskLeaseManager, TaskSnapshot, TaskUpdate,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Fixed start instant for deterministic tests
pub fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp")
}

pub fn actor(name: &str) -> ActorId {
    ActorId::parse(name).expect("non-empty actor")
}

pub fn task_id(id: &str) -> TaskId {
    TaskId::from(id)
}

pub fn seeded_store(ids: &[&str]) -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::with_tasks(
        ids.iter().map(|id| Task::new(*id, format!("Task {id}"), epoch())),
    ))
}

/// Manager on a manual clock over an in-memory store
pub struct TestEnv {
    pub manager: Arc<TaskLeaseManager>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryStore>,
}

impl TestEnv {
    pub fn new(ids: &[&str]) -> Self {
        Self::with_config(ids, LeaseConfig::new())
    }

    pub fn with_config(ids: &[&str], config: LeaseConfig) -> Self {
        let clock = Arc::new(ManualClock::new(epoch()));
        let store = seeded_store(ids);
        let manager = Arc::new(
            TaskLeaseManager::new(store.clone(), config)
                .expect("valid lease config")
                .with_clock(clock.clone()),
        );
        Self {
            manager,
            clock,
            store,
        }
    }

    /// Move past the end of a lease granted now
    pub fn expire_leases(&self) {
        let secs = i64::try_from(self.manager.config().lease_duration_secs).unwrap_or(i64::MAX / 1000);
        self.clock.advance(Duration::seconds(secs) + Duration::seconds(1));
    }
}

/// Store wrapper that fails on demand
pub struct FlakyStore {
    inner: Arc<dyn LeaseStore>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_events: AtomicBool,
    commits: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn LeaseStore>) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_events: AtomicBool::new(false),
            commits: AtomicUsize::new(0),
        }
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn fail_events(&self, on: bool) {
        self.fail_events.store(on, Ordering::SeqCst);
    }

    /// Commits that reached the inner store
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LeaseStore for FlakyStore {
    async fn insert_task(&self, task: Task) -> Result<(), StoreError> {
        Self::check(&self.fail_writes)?;
        self.inner.insert_task(task).await
    }

    async fn read_task(&self, task_id: &TaskId) -> Result<Option<Task>, StoreError> {
        Self::check(&self.fail_reads)?;
        self.inner.read_task(task_id).await
    }

    async fn read_lease(&self, task_id: &TaskId) -> Result<Option<TaskLease>, StoreError> {
        Self::check(&self.fail_reads)?;
        self.inner.read_lease(task_id).await
    }

    async fn read_snapshot(&self, task_id: &TaskId) -> Result<Option<TaskSnapshot>, StoreError> {
        Self::check(&self.fail_reads)?;
        self.inner.read_snapshot(task_id).await
    }

    async fn upsert_lease(&self, lease: TaskLease) -> Result<TaskLease, StoreError> {
        Self::check(&self.fail_writes)?;
        self.inner.upsert_lease(lease).await
    }

    async fn delete_lease(&self, task_id: &TaskId, holder: &ActorId) -> Result<bool, StoreError> {
        Self::check(&self.fail_writes)?;
        self.inner.delete_lease(task_id, holder).await
    }

    async fn update_task_status(
        &self,
        task_id: &TaskId,
        update: TaskUpdate,
    ) -> Result<(), StoreError> {
        Self::check(&self.fail_writes)?;
        self.inner.update_task_status(task_id, update).await
    }

    async fn append_event(&self, event: AuditEvent) -> Result<(), StoreError> {
        Self::check(&self.fail_events)?;
        self.inner.append_event(event).await
    }

    async fn list_events(&self, task_id: &TaskId) -> Result<Vec<AuditEvent>, StoreError> {
        Self::check(&self.fail_reads)?;
        self.inner.list_events(task_id).await
    }

    async fn commit(&self, commit: LeaseCommit) -> Result<CommitOutcome, StoreError> {
        Self::check(&self.fail_writes)?;
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit(commit).await
    }
}

/// Manager over a [`FlakyStore`] wrapping a seeded in-memory store
pub fn flaky_env(ids: &[&str]) -> (Arc<TaskLeaseManager>, Arc<FlakyStore>, Arc<InMemoryStore>) {
    let inner = seeded_store(ids);
    let flaky = Arc::new(FlakyStore::new(inner.clone()));
    let manager = Arc::new(
        TaskLeaseManager::new(flaky.clone(), LeaseConfig::new())
            .expect("default config is valid")
            .with_clock(Arc::new(ManualClock::new(epoch()))),
    );
    (manager, flaky, inner)
}
