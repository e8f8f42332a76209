//! Task lease manager
//!
//! Grants one actor at a time a time-boxed lease on a task:
//! - Acquire (fresh grant, renewal by the holder, reclaim of an expired lease)
//! - Release by the holder
//! - Lazy expiry: liveness is recomputed on every read, there is no sweeper
//! - Status lifecycle moves in the same atomic write as the lease
//!
//! Every mutation reads a [`TaskSnapshot`], decides against it, and submits a
//! guarded [`LeaseCommit`]. A stale snapshot is re-decided with the state the
//! store returned, so racing actors serialize on the store's row lock.

use crate::clock::{Clock, SystemClock};
use crate::config::LeaseConfig;
use crate::error::{ConfigError, LeaseError, StoreError};
use crate::state_machine::validate_transition;
use crate::store::{CommitOutcome, LeaseCommit, LeaseStore, LeaseWrite};
use crate::types::{
    ActorId, AuditEvent, EventType, LockStatus, Task, TaskId, TaskLease, TaskSnapshot, TaskStatus,
    TaskUpdate,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;

/// Outcome of a decision against a snapshot
struct Plan {
    lease: LeaseWrite,
    task: TaskUpdate,
    event: EventType,
    details: serde_json::Value,
}

/// Mediates exclusive, expiring edit rights on tasks
pub struct TaskLeaseManager {
    /// Backing store
    store: Arc<dyn LeaseStore>,
    /// Time source for grants and liveness
    clock: Arc<dyn Clock>,
    /// Configuration
    config: LeaseConfig,
}

impl std::fmt::Debug for TaskLeaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskLeaseManager")
            .field("clock", &self.clock)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TaskLeaseManager {
    /// Create manager on the system clock
    ///
    /// # Errors
    /// - `ConfigError::Invalid` if `config` fails [`LeaseConfig::validate`]
    pub fn new(store: Arc<dyn LeaseStore>, config: LeaseConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            clock: Arc::new(SystemClock),
            config,
        })
    }

    /// With clock
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    /// Current time as seen by the manager
    #[inline]
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Register a new task
    ///
    /// # Errors
    /// - `LeaseError::TaskExists` if the id is already registered
    /// - `LeaseError::StoreUnavailable` on store failure
    pub async fn register_task(&self, task: Task) -> Result<(), LeaseError> {
        tracing::debug!("Registering task {}", task.id);
        let task_id = task.id.clone();
        match self.store.insert_task(task).await {
            Ok(()) => Ok(()),
            Err(StoreError::Rejected(_)) => Err(LeaseError::TaskExists(task_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch a task row
    ///
    /// # Errors
    /// - `LeaseError::TaskNotFound` if the task does not exist
    /// - `LeaseError::StoreUnavailable` on store failure
    pub async fn task(&self, task_id: &TaskId) -> Result<Task, LeaseError> {
        self.store
            .read_task(task_id)
            .await?
            .ok_or_else(|| LeaseError::TaskNotFound(task_id.clone()))
    }

    /// Acquire (or renew) the lease on a task
    ///
    /// Succeeds when no lease exists, the existing lease has expired, or
    /// `actor` already holds it. Sets the task to `claimed` and assigns it to
    /// `actor` in the same write.
    ///
    /// # Errors
    /// - `LeaseError::AlreadyLocked` if another actor holds a live lease
    /// - `LeaseError::TaskNotFound` if the task does not exist
    /// - `LeaseError::TaskClosed` if the task is done
    /// - `LeaseError::InvalidTransition` if the task is blocked
    /// - `LeaseError::Contended` if the snapshot kept going stale
    /// - `LeaseError::StoreUnavailable` on store failure
    pub async fn acquire(&self, task_id: &TaskId, actor: &ActorId) -> Result<TaskLease, LeaseError> {
        let duration = self.config.lease_duration();

        let snapshot = self
            .commit_with(task_id, actor, |snapshot, now| {
                let status = snapshot.task.status;
                if status.is_terminal() {
                    return Err(LeaseError::TaskClosed(task_id.clone()));
                }
                if let Some(live) = snapshot.live_lease(now) {
                    if !live.is_held_by(actor) {
                        return Err(LeaseError::AlreadyLocked {
                            task_id: task_id.clone(),
                            holder: live.holder.clone(),
                        });
                    }
                }
                validate_transition(task_id, status, TaskStatus::Claimed)?;

                let lease = TaskLease::grant(task_id.clone(), actor.clone(), now, duration)?;
                let mut details = json!({ "expires_at": lease.expires_at });
                match &snapshot.lease {
                    Some(prev) if prev.is_held_by(actor) => details["renewal"] = json!(true),
                    Some(prev) => details["previous_holder"] = json!(prev.holder),
                    None => {}
                }

                Ok(Plan {
                    lease: LeaseWrite::Put(lease),
                    task: TaskUpdate {
                        status: TaskStatus::Claimed,
                        assigned_to: Some(actor.clone()),
                        updated_at: now,
                    },
                    event: EventType::Claimed,
                    details,
                })
            })
            .await?;

        let lease = snapshot
            .lease
            .ok_or_else(|| LeaseError::Contended(task_id.clone()))?;
        tracing::info!("Lease on {} granted to {} until {}", task_id, actor, lease.expires_at);
        Ok(lease)
    }

    /// Release the lease held by `actor`
    ///
    /// Deletes the lease row and returns the task to `open`. The match is on
    /// holder only, so the former holder may clear an expired row.
    ///
    /// # Errors
    /// - `LeaseError::NotHolder` if `actor` does not hold the lease (no-op)
    /// - `LeaseError::TaskNotFound` if the task does not exist
    /// - `LeaseError::StoreUnavailable` on store failure
    pub async fn release(&self, task_id: &TaskId, actor: &ActorId) -> Result<(), LeaseError> {
        let result = self
            .commit_with(task_id, actor, |snapshot, now| {
                let held = snapshot.lease.as_ref().is_some_and(|l| l.is_held_by(actor));
                if !held {
                    return Err(LeaseError::NotHolder {
                        task_id: task_id.clone(),
                        actor: actor.clone(),
                    });
                }
                if snapshot.task.status != TaskStatus::Open {
                    validate_transition(task_id, snapshot.task.status, TaskStatus::Open)?;
                }

                Ok(Plan {
                    lease: LeaseWrite::Delete,
                    task: TaskUpdate {
                        status: TaskStatus::Open,
                        assigned_to: None,
                        updated_at: now,
                    },
                    event: EventType::Released,
                    details: serde_json::Value::Null,
                })
            })
            .await;

        match result {
            Ok(_) => {
                tracing::info!("Lease on {} released by {}", task_id, actor);
                Ok(())
            }
            Err(e @ LeaseError::NotHolder { .. }) => {
                tracing::debug!("Release ignored: {}", e);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Extend a live lease without touching the task status
    ///
    /// # Errors
    /// - `LeaseError::NotHolder` unless `actor` holds a live lease
    /// - `LeaseError::TaskNotFound` if the task does not exist
    /// - `LeaseError::StoreUnavailable` on store failure
    pub async fn renew(&self, task_id: &TaskId, actor: &ActorId) -> Result<TaskLease, LeaseError> {
        let duration = self.config.lease_duration();

        let snapshot = self
            .commit_with(task_id, actor, |snapshot, now| {
                self.require_live_holder(snapshot, task_id, actor, now)?;
                let lease = TaskLease::grant(task_id.clone(), actor.clone(), now, duration)?;
                let details = json!({ "expires_at": lease.expires_at });

                Ok(Plan {
                    lease: LeaseWrite::Put(lease),
                    task: TaskUpdate {
                        status: snapshot.task.status,
                        assigned_to: snapshot.task.assigned_to.clone(),
                        updated_at: snapshot.task.updated_at,
                    },
                    event: EventType::Renewed,
                    details,
                })
            })
            .await?;

        snapshot
            .lease
            .ok_or_else(|| LeaseError::Contended(task_id.clone()))
    }

    /// Move a claimed task to `active`
    ///
    /// # Errors
    /// - `LeaseError::NotHolder` unless `actor` holds a live lease
    /// - `LeaseError::InvalidTransition` unless the task is `claimed`
    /// - `LeaseError::TaskNotFound` / `LeaseError::StoreUnavailable`
    pub async fn start(&self, task_id: &TaskId, actor: &ActorId) -> Result<Task, LeaseError> {
        self.transition(task_id, actor, TaskStatus::Active, LeaseWrite::Keep, None)
            .await
    }

    /// Finish an active task and drop its lease
    ///
    /// # Errors
    /// - `LeaseError::NotHolder` unless `actor` holds a live lease
    /// - `LeaseError::InvalidTransition` unless the task is `active`
    /// - `LeaseError::TaskNotFound` / `LeaseError::StoreUnavailable`
    pub async fn complete(&self, task_id: &TaskId, actor: &ActorId) -> Result<Task, LeaseError> {
        self.transition(task_id, actor, TaskStatus::Done, LeaseWrite::Delete, None)
            .await
    }

    /// Park a claimed or active task and drop its lease
    ///
    /// # Errors
    /// - `LeaseError::NotHolder` unless `actor` holds a live lease
    /// - `LeaseError::InvalidTransition` from any other status
    /// - `LeaseError::TaskNotFound` / `LeaseError::StoreUnavailable`
    pub async fn block(
        &self,
        task_id: &TaskId,
        actor: &ActorId,
        reason: &str,
    ) -> Result<Task, LeaseError> {
        self.transition(
            task_id,
            actor,
            TaskStatus::Blocked,
            LeaseWrite::Delete,
            Some(json!({ "reason": reason })),
        )
        .await
    }

    /// Return a blocked task to `open`
    ///
    /// # Errors
    /// - `LeaseError::InvalidTransition` unless the task is `blocked`
    /// - `LeaseError::TaskNotFound` / `LeaseError::StoreUnavailable`
    pub async fn reopen(&self, task_id: &TaskId, actor: &ActorId) -> Result<Task, LeaseError> {
        let snapshot = self
            .commit_with(task_id, actor, |snapshot, now| {
                if snapshot.task.status != TaskStatus::Blocked {
                    return Err(LeaseError::InvalidTransition {
                        task_id: task_id.clone(),
                        from: snapshot.task.status,
                        to: TaskStatus::Open,
                    });
                }

                Ok(Plan {
                    lease: LeaseWrite::Keep,
                    task: TaskUpdate {
                        status: TaskStatus::Open,
                        assigned_to: None,
                        updated_at: now,
                    },
                    event: EventType::Reopened,
                    details: serde_json::Value::Null,
                })
            })
            .await?;

        tracing::info!("Task {} reopened by {}", task_id, actor);
        Ok(snapshot.task)
    }

    /// Check if a live lease exists
    ///
    /// # Errors
    /// - `LeaseError::StoreUnavailable` on store failure
    pub async fn is_locked(&self, task_id: &TaskId) -> Result<bool, LeaseError> {
        let lease = self.store.read_lease(task_id).await?;
        Ok(lease.is_some_and(|l| l.is_live(self.clock.now())))
    }

    /// Check if the task can be claimed (no live lease)
    ///
    /// # Errors
    /// - `LeaseError::StoreUnavailable` on store failure
    pub async fn can_claim(&self, task_id: &TaskId) -> Result<bool, LeaseError> {
        Ok(!self.is_locked(task_id).await?)
    }

    /// Holder of the lease row, live or expired
    ///
    /// Combine with [`TaskLeaseManager::is_locked`] when liveness matters.
    ///
    /// # Errors
    /// - `LeaseError::StoreUnavailable` on store failure
    pub async fn lock_owner(&self, task_id: &TaskId) -> Result<Option<ActorId>, LeaseError> {
        let lease = self.store.read_lease(task_id).await?;
        Ok(lease.map(|l| l.holder))
    }

    /// Lock read model for one task
    ///
    /// # Errors
    /// - `LeaseError::StoreUnavailable` on store failure
    pub async fn lock_status(&self, task_id: &TaskId) -> Result<LockStatus, LeaseError> {
        let lease = self.store.read_lease(task_id).await?;
        Ok(LockStatus::from_lease(
            task_id.clone(),
            lease.as_ref(),
            self.clock.now(),
        ))
    }

    /// Lock read model for several tasks, in input order
    ///
    /// # Errors
    /// - `LeaseError::StoreUnavailable` if any read fails
    pub async fn lock_statuses(&self, task_ids: &[TaskId]) -> Result<Vec<LockStatus>, LeaseError> {
        futures::future::try_join_all(task_ids.iter().map(|id| self.lock_status(id))).await
    }

    /// Audit trail of a task
    ///
    /// # Errors
    /// - `LeaseError::StoreUnavailable` on store failure
    pub async fn history(&self, task_id: &TaskId) -> Result<Vec<AuditEvent>, LeaseError> {
        Ok(self.store.list_events(task_id).await?)
    }

    /// Status change that requires a live lease held by `actor`
    async fn transition(
        &self,
        task_id: &TaskId,
        actor: &ActorId,
        to: TaskStatus,
        lease: LeaseWrite,
        details: Option<serde_json::Value>,
    ) -> Result<Task, LeaseError> {
        let event = match to {
            TaskStatus::Active => EventType::Started,
            TaskStatus::Done => EventType::Completed,
            _ => EventType::Blocked,
        };

        let snapshot = self
            .commit_with(task_id, actor, |snapshot, now| {
                self.require_live_holder(snapshot, task_id, actor, now)?;
                validate_transition(task_id, snapshot.task.status, to)?;

                // Done keeps the finisher; blocked is unassigned
                let assigned_to = match to {
                    TaskStatus::Blocked => None,
                    _ => Some(actor.clone()),
                };

                Ok(Plan {
                    lease: lease.clone(),
                    task: TaskUpdate {
                        status: to,
                        assigned_to,
                        updated_at: now,
                    },
                    event,
                    details: details.clone().unwrap_or(serde_json::Value::Null),
                })
            })
            .await?;

        tracing::info!("Task {} moved to {} by {}", task_id, to, actor);
        Ok(snapshot.task)
    }

    fn require_live_holder(
        &self,
        snapshot: &TaskSnapshot,
        task_id: &TaskId,
        actor: &ActorId,
        now: DateTime<Utc>,
    ) -> Result<(), LeaseError> {
        match snapshot.live_lease(now) {
            Some(lease) if lease.is_held_by(actor) => Ok(()),
            _ => Err(LeaseError::NotHolder {
                task_id: task_id.clone(),
                actor: actor.clone(),
            }),
        }
    }

    /// Decide against the current snapshot and commit, re-deciding on stale
    async fn commit_with<F>(
        &self,
        task_id: &TaskId,
        actor: &ActorId,
        mut decide: F,
    ) -> Result<TaskSnapshot, LeaseError>
    where
        F: FnMut(&TaskSnapshot, DateTime<Utc>) -> Result<Plan, LeaseError>,
    {
        let mut snapshot = self
            .store
            .read_snapshot(task_id)
            .await?
            .ok_or_else(|| LeaseError::TaskNotFound(task_id.clone()))?;

        for attempt in 1..=self.config.max_commit_attempts {
            let now = self.clock.now();
            let plan = decide(&snapshot, now)?;

            let commit = LeaseCommit {
                task_id: task_id.clone(),
                expected_lease: snapshot.lease.clone(),
                expected_status: snapshot.task.status,
                lease: plan.lease,
                task: plan.task,
            };

            match self.store.commit(commit).await? {
                CommitOutcome::Committed(committed) => {
                    self.record(task_id, plan.event, actor, now, plan.details)
                        .await;
                    return Ok(committed);
                }
                CommitOutcome::Stale(current) => {
                    tracing::debug!("Stale snapshot for {} (attempt {})", task_id, attempt);
                    snapshot = current;
                }
                CommitOutcome::Missing => {
                    return Err(LeaseError::TaskNotFound(task_id.clone()));
                }
            }
        }

        tracing::warn!(
            "Giving up on {} after {} attempts",
            task_id,
            self.config.max_commit_attempts
        );
        Err(LeaseError::Contended(task_id.clone()))
    }

    /// Best-effort audit append
    async fn record(
        &self,
        task_id: &TaskId,
        event_type: EventType,
        actor: &ActorId,
        at: DateTime<Utc>,
        details: serde_json::Value,
    ) {
        if !self.config.record_events {
            return;
        }

        let event = AuditEvent::new(task_id.clone(), event_type, actor.clone(), at)
            .with_details(details);
        if let Err(e) = self.store.append_event(event).await {
            tracing::warn!("Failed to record {} event for {}: {}", event_type, task_id, e);
        }
    }
}
