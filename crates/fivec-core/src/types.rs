//! Core types for the lease manager
//!
//! Defines the records the manager reads and writes:
//! - Task and actor identifiers
//! - Tasks and their status
//! - Task leases (the "lock" rows)
//! - Audit events
//! - The lock read model consumed by display collaborators

use crate::error::{ActorError, LeaseError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Task identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate new task ID (ULID for sortability)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Borrow the raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque actor identifier supplied by the identity provider
///
/// Never empty: construct through [`ActorId::parse`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActorId(String);

impl ActorId {
    /// Parse an actor identifier, rejecting blank input
    ///
    /// # Errors
    /// - `ActorError::Empty` if the value is empty or whitespace only
    pub fn parse(value: impl Into<String>) -> Result<Self, ActorError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ActorError::Empty);
        }
        Ok(Self(value))
    }

    /// Borrow the raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ActorId {
    type Error = ActorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ActorId> for String {
    fn from(value: ActorId) -> Self {
        value.0
    }
}

impl std::str::FromStr for ActorId {
    type Err = ActorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task workflow status, denormalized alongside the lease
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Nobody is working on the task
    Open,
    /// Claimed by the lease holder
    Claimed,
    /// Work in progress by the lease holder
    Active,
    /// Finished (terminal)
    Done,
    /// Parked until reopened
    Blocked,
}

impl TaskStatus {
    /// Lowercase name as stored
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Claimed => "claimed",
            TaskStatus::Active => "active",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
        }
    }

    /// Check if no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task ID
    pub id: TaskId,
    /// Display title
    pub title: String,
    /// Current status
    pub status: TaskStatus,
    /// Mirrors the current lease holder
    pub assigned_to: Option<ActorId>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create an open, unassigned task
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: TaskStatus::Open,
            assigned_to: None,
            updated_at: now,
        }
    }

    /// Apply a status update in place
    pub fn apply(&mut self, update: &TaskUpdate) {
        self.status = update.status;
        self.assigned_to.clone_from(&update.assigned_to);
        self.updated_at = update.updated_at;
    }
}

/// Status + assignment write for a task row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUpdate {
    /// New status
    pub status: TaskStatus,
    /// New assignee (None clears it)
    pub assigned_to: Option<ActorId>,
    /// Write timestamp
    pub updated_at: DateTime<Utc>,
}

/// Time-limited exclusive claim on a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLease {
    /// Protected task
    pub task_id: TaskId,
    /// Actor holding the lease
    pub holder: ActorId,
    /// When the lease was granted or last renewed
    pub acquired_at: DateTime<Utc>,
    /// After this instant the lease is void
    pub expires_at: DateTime<Utc>,
}

impl TaskLease {
    /// Grant a lease starting at `now`
    ///
    /// # Errors
    /// - `LeaseError::ExpiryOutOfRange` if `now + duration` overflows
    pub fn grant(
        task_id: TaskId,
        holder: ActorId,
        now: DateTime<Utc>,
        duration: Duration,
    ) -> Result<Self, LeaseError> {
        let Some(expires_at) = now.checked_add_signed(duration) else {
            return Err(LeaseError::ExpiryOutOfRange(task_id));
        };
        Ok(Self {
            task_id,
            holder,
            acquired_at: now,
            expires_at,
        })
    }

    /// Live iff `now < expires_at`
    #[inline]
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Check if the lease belongs to `actor`
    #[inline]
    #[must_use]
    pub fn is_held_by(&self, actor: &ActorId) -> bool {
        &self.holder == actor
    }

    /// Time left before expiry, zero once expired
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

/// Task row together with its lease row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Task row
    pub task: Task,
    /// Lease row, live or not
    pub lease: Option<TaskLease>,
}

impl TaskSnapshot {
    /// Live lease, if any
    #[inline]
    #[must_use]
    pub fn live_lease(&self, now: DateTime<Utc>) -> Option<&TaskLease> {
        self.lease.as_ref().filter(|l| l.is_live(now))
    }
}

/// Audit event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Lease granted (fresh, renewed via acquire, or reclaimed)
    Claimed,
    /// Lease extended via renew
    Renewed,
    /// Lease released by its holder
    Released,
    /// Work started
    Started,
    /// Task finished
    Completed,
    /// Task parked
    Blocked,
    /// Blocked task reopened
    Reopened,
}

impl EventType {
    /// Stored event name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Claimed => "claimed",
            EventType::Renewed => "renewed",
            EventType::Released => "released",
            EventType::Started => "started",
            EventType::Completed => "completed",
            EventType::Blocked => "blocked",
            EventType::Reopened => "reopened",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event ID (ULID)
    pub id: Ulid,
    /// Task the event belongs to
    pub task_id: TaskId,
    /// Event kind
    pub event_type: EventType,
    /// Acting identity
    pub actor: ActorId,
    /// When it happened
    pub at: DateTime<Utc>,
    /// Free-form details
    pub details: serde_json::Value,
}

impl AuditEvent {
    /// Create event with empty details
    #[must_use]
    pub fn new(task_id: TaskId, event_type: EventType, actor: ActorId, at: DateTime<Utc>) -> Self {
        Self {
            id: Ulid::new(),
            task_id,
            event_type,
            actor,
            at,
            details: serde_json::Value::Null,
        }
    }

    /// With details
    #[inline]
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Lock state as shown to display collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStatus {
    /// Task ID
    pub task_id: TaskId,
    /// Lease holder regardless of expiry
    pub owner: Option<ActorId>,
    /// Whether a live lease exists
    pub locked: bool,
    /// Expiry of the current lease row
    pub expires_at: Option<DateTime<Utc>>,
}

impl LockStatus {
    /// Compute lock status from an optional lease row
    #[must_use]
    pub fn from_lease(task_id: TaskId, lease: Option<&TaskLease>, now: DateTime<Utc>) -> Self {
        Self {
            task_id,
            owner: lease.map(|l| l.holder.clone()),
            locked: lease.is_some_and(|l| l.is_live(now)),
            expires_at: lease.map(|l| l.expires_at),
        }
    }

    /// Check if `actor` may edit the task
    #[inline]
    #[must_use]
    pub fn editable_by(&self, actor: &ActorId) -> bool {
        !self.locked || self.owner.as_ref() == Some(actor)
    }
}
