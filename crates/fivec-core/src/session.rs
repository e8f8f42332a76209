//! Per-user lease session
//!
//! Binds a shared [`TaskLeaseManager`] to the identity of whoever is signed
//! in, so callers act "as the current user" without threading actor ids
//! through every call. One session per authenticated context; dropping it
//! releases nothing (leases expire on their own).

use crate::error::LeaseError;
use crate::identity::ActorSource;
use crate::manager::TaskLeaseManager;
use crate::types::{ActorId, Task, TaskId, TaskLease};
use crate::watch::LockWatcher;
use std::sync::Arc;

/// Lease operations on behalf of the current actor
#[derive(Debug, Clone)]
pub struct LeaseSession {
    manager: Arc<TaskLeaseManager>,
    identity: Arc<dyn ActorSource>,
}

impl LeaseSession {
    /// Create session
    #[inline]
    #[must_use]
    pub fn new(manager: Arc<TaskLeaseManager>, identity: Arc<dyn ActorSource>) -> Self {
        Self { manager, identity }
    }

    /// Underlying manager
    #[inline]
    #[must_use]
    pub fn manager(&self) -> &Arc<TaskLeaseManager> {
        &self.manager
    }

    /// Current actor
    ///
    /// # Errors
    /// - `LeaseError::Unauthenticated` when nobody is signed in
    pub fn actor(&self) -> Result<ActorId, LeaseError> {
        self.identity
            .current_actor()
            .ok_or(LeaseError::Unauthenticated)
    }

    /// Claim a task as the current actor
    ///
    /// # Errors
    /// See [`TaskLeaseManager::acquire`], plus `LeaseError::Unauthenticated`
    pub async fn claim(&self, task_id: &TaskId) -> Result<TaskLease, LeaseError> {
        let actor = self.actor()?;
        self.manager.acquire(task_id, &actor).await
    }

    /// Release the current actor's lease
    ///
    /// # Errors
    /// See [`TaskLeaseManager::release`], plus `LeaseError::Unauthenticated`
    pub async fn release(&self, task_id: &TaskId) -> Result<(), LeaseError> {
        let actor = self.actor()?;
        self.manager.release(task_id, &actor).await
    }

    /// Extend the current actor's lease
    ///
    /// # Errors
    /// See [`TaskLeaseManager::renew`], plus `LeaseError::Unauthenticated`
    pub async fn renew(&self, task_id: &TaskId) -> Result<TaskLease, LeaseError> {
        let actor = self.actor()?;
        self.manager.renew(task_id, &actor).await
    }

    /// Start work on a claimed task
    ///
    /// # Errors
    /// See [`TaskLeaseManager::start`], plus `LeaseError::Unauthenticated`
    pub async fn start(&self, task_id: &TaskId) -> Result<Task, LeaseError> {
        let actor = self.actor()?;
        self.manager.start(task_id, &actor).await
    }

    /// Finish an active task
    ///
    /// # Errors
    /// See [`TaskLeaseManager::complete`], plus `LeaseError::Unauthenticated`
    pub async fn complete(&self, task_id: &TaskId) -> Result<Task, LeaseError> {
        let actor = self.actor()?;
        self.manager.complete(task_id, &actor).await
    }

    /// Park a task
    ///
    /// # Errors
    /// See [`TaskLeaseManager::block`], plus `LeaseError::Unauthenticated`
    pub async fn block(&self, task_id: &TaskId, reason: &str) -> Result<Task, LeaseError> {
        let actor = self.actor()?;
        self.manager.block(task_id, &actor, reason).await
    }

    /// Reopen a blocked task
    ///
    /// # Errors
    /// See [`TaskLeaseManager::reopen`], plus `LeaseError::Unauthenticated`
    pub async fn reopen(&self, task_id: &TaskId) -> Result<Task, LeaseError> {
        let actor = self.actor()?;
        self.manager.reopen(task_id, &actor).await
    }

    /// Whether the editor should be enabled for the current actor
    ///
    /// True when the task is unlocked or locked by the current actor.
    ///
    /// # Errors
    /// - `LeaseError::Unauthenticated` when nobody is signed in
    /// - `LeaseError::StoreUnavailable` on store failure
    pub async fn can_edit(&self, task_id: &TaskId) -> Result<bool, LeaseError> {
        let actor = self.actor()?;
        let status = self.manager.lock_status(task_id).await?;
        Ok(status.editable_by(&actor))
    }

    /// Watch lock state of `task_ids` on the configured interval
    ///
    /// # Errors
    /// - `LeaseError::StoreUnavailable` if the initial read fails
    pub async fn watch(&self, task_ids: Vec<TaskId>) -> Result<LockWatcher, LeaseError> {
        LockWatcher::spawn(self.manager.clone(), task_ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::LeaseConfig;
    use crate::identity::{Anonymous, StaticActor};
    use crate::store::InMemoryStore;
    use chrono::DateTime;

    fn manager() -> Arc<TaskLeaseManager> {
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let store = Arc::new(InMemoryStore::with_tasks([Task::new("t1", "Audit zone bundle", start)]));
        Arc::new(
            TaskLeaseManager::new(store, LeaseConfig::new().with_watch_interval_ms(1_000))
                .unwrap()
                .with_clock(Arc::new(ManualClock::new(start))),
        )
    }

    fn session(manager: &Arc<TaskLeaseManager>, name: &str) -> LeaseSession {
        LeaseSession::new(
            manager.clone(),
            Arc::new(StaticActor::new(ActorId::parse(name).unwrap())),
        )
    }

    #[tokio::test]
    async fn sessions_share_one_manager() {
        let manager = manager();
        let alice = session(&manager, "alice");
        let bob = session(&manager, "bob");
        let t1 = TaskId::from("t1");

        alice.claim(&t1).await.unwrap();
        assert!(alice.can_edit(&t1).await.unwrap());
        assert!(!bob.can_edit(&t1).await.unwrap());
        assert!(bob.claim(&t1).await.unwrap_err().is_conflict());

        alice.release(&t1).await.unwrap();
        assert!(bob.can_edit(&t1).await.unwrap());
    }

    #[tokio::test]
    async fn anonymous_session_is_rejected() {
        let manager = manager();
        let session = LeaseSession::new(manager, Arc::new(Anonymous));

        let err = session.claim(&TaskId::from("t1")).await.unwrap_err();
        assert!(matches!(err, LeaseError::Unauthenticated));
        assert!(session.can_edit(&TaskId::from("t1")).await.is_err());
    }

    #[tokio::test]
    async fn lifecycle_through_session() {
        let manager = manager();
        let alice = session(&manager, "alice");
        let t1 = TaskId::from("t1");

        alice.claim(&t1).await.unwrap();
        alice.renew(&t1).await.unwrap();
        alice.start(&t1).await.unwrap();
        alice.block(&t1, "needs sign-off").await.unwrap();
        let task = alice.reopen(&t1).await.unwrap();
        assert_eq!(task.status, crate::types::TaskStatus::Open);

        alice.claim(&t1).await.unwrap();
        alice.start(&t1).await.unwrap();
        let task = alice.complete(&t1).await.unwrap();
        assert_eq!(task.status, crate::types::TaskStatus::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn watch_follows_claims() {
        let manager = manager();
        let alice = session(&manager, "alice");
        let t1 = TaskId::from("t1");

        let watcher = alice.watch(vec![t1.clone()]).await.unwrap();
        let mut rx = watcher.subscribe();
        assert!(!watcher.latest().get(&t1).unwrap().locked);

        alice.claim(&t1).await.unwrap();
        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone();
        let status = snapshot.get(&t1).unwrap();
        assert!(status.locked);
        assert_eq!(status.owner.as_ref().map(ActorId::as_str), Some("alice"));

        watcher.shutdown().await;
    }
}
