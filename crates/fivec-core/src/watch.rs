//! Scheduled lock refresh
//!
//! A [`LockWatcher`] recomputes the lock state of a fixed set of tasks on a
//! fixed interval and publishes it on a `tokio::sync::watch` channel.
//! Shutdown is explicit ([`LockWatcher::shutdown`]); dropping the watcher
//! aborts the refresh task.

use crate::error::{ConfigError, LeaseError};
use crate::manager::TaskLeaseManager;
use crate::types::{LockStatus, TaskId};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Lock state of the watched tasks at one refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSnapshot {
    /// One entry per watched task, in watch order
    pub statuses: Vec<LockStatus>,
    /// Manager clock at refresh time
    pub refreshed_at: DateTime<Utc>,
}

impl LockSnapshot {
    /// Status of one task
    #[must_use]
    pub fn get(&self, task_id: &TaskId) -> Option<&LockStatus> {
        self.statuses.iter().find(|s| &s.task_id == task_id)
    }
}

/// Periodic lock refresher
#[derive(Debug)]
pub struct LockWatcher {
    rx: watch::Receiver<LockSnapshot>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LockWatcher {
    /// Start watching on the manager's configured interval
    ///
    /// # Errors
    /// - `LeaseError::StoreUnavailable` if the initial read fails
    pub async fn spawn(
        manager: Arc<TaskLeaseManager>,
        task_ids: Vec<TaskId>,
    ) -> Result<Self, LeaseError> {
        let interval = manager.config().watch_interval();
        Self::spawn_with_interval(manager, task_ids, interval).await
    }

    /// Start watching with an explicit interval
    ///
    /// The first snapshot is read before returning, so subscribers never see
    /// an empty placeholder.
    ///
    /// # Errors
    /// - `LeaseError::InvalidConfig` for a zero `interval`
    /// - `LeaseError::StoreUnavailable` if the initial read fails
    pub async fn spawn_with_interval(
        manager: Arc<TaskLeaseManager>,
        task_ids: Vec<TaskId>,
        interval: Duration,
    ) -> Result<Self, LeaseError> {
        if interval.is_zero() {
            return Err(ConfigError::Invalid("watch interval must be > 0".to_string()).into());
        }

        let initial = LockSnapshot {
            statuses: manager.lock_statuses(&task_ids).await?,
            refreshed_at: manager.now(),
        };
        let (tx, rx) = watch::channel(initial);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(refresh_loop(manager, task_ids, interval, tx, shutdown_rx));

        Ok(Self {
            rx,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// New receiver for snapshots
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LockSnapshot> {
        self.rx.clone()
    }

    /// Latest snapshot
    #[must_use]
    pub fn latest(&self) -> LockSnapshot {
        self.rx.borrow().clone()
    }

    /// Stop refreshing and wait for the loop to exit
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!("Lock watcher exited abnormally: {}", e);
            }
        }
    }
}

impl Drop for LockWatcher {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn refresh_loop(
    manager: Arc<TaskLeaseManager>,
    task_ids: Vec<TaskId>,
    interval: Duration,
    tx: watch::Sender<LockSnapshot>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately; the initial snapshot already covers it
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                match manager.lock_statuses(&task_ids).await {
                    Ok(statuses) => {
                        let snapshot = LockSnapshot {
                            statuses,
                            refreshed_at: manager.now(),
                        };
                        tx.send_replace(snapshot);
                    }
                    Err(e) => {
                        tracing::warn!("Lock refresh failed, keeping previous snapshot: {}", e);
                    }
                }
            }
        }
    }

    tracing::debug!("Lock watcher stopped");
}
