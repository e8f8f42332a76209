//! 5C Workspace task leases
//!
//! Grants exclusive, time-limited editing rights on tasks:
//! - One live lease per task, held by one actor
//! - Expiry instead of heartbeats; liveness is recomputed on every read
//! - Manual release or expiry as the two ways a lease ends
//! - Task status and assignee written in the same atomic store call as the lease
//!
//! # Example
//!
//! ```rust,ignore
//! use fivec_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryStore::new());
//! let manager = TaskLeaseManager::new(store, LeaseConfig::new())?;
//! manager.register_task(Task::new("t1", "Review claim", manager.now())).await?;
//!
//! let alice = ActorId::parse("alice")?;
//! let lease = manager.acquire(&TaskId::from("t1"), &alice).await?;
//! println!("held until {}", lease.expires_at);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod manager;
pub mod session;
pub mod state_machine;
pub mod store;
pub mod types;
pub mod watch;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LeaseConfig;
pub use error::{ActorError, ConfigError, LeaseError, StoreError};
pub use identity::{ActorSource, Anonymous, StaticActor};
pub use manager::TaskLeaseManager;
pub use session::LeaseSession;
pub use store::{CommitOutcome, InMemoryStore, LeaseCommit, LeaseStore, LeaseWrite};
pub use types::{
    ActorId, AuditEvent, EventType, LockStatus, Task, TaskId, TaskLease, TaskSnapshot, TaskStatus,
    TaskUpdate,
};
pub use watch::{LockSnapshot, LockWatcher};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with task leases
    pub use crate::{
        ActorId, InMemoryStore, LeaseConfig, LeaseError, LeaseSession, LeaseStore, LockStatus,
        Task, TaskId, TaskLease, TaskLeaseManager, TaskStatus,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
