//! Identity port
//!
//! The authentication context lives outside this crate. The manager only
//! needs the current actor as an opaque [`ActorId`].

use crate::types::ActorId;

/// Supplies the currently authenticated actor
pub trait ActorSource: Send + Sync + std::fmt::Debug {
    /// Current actor, or `None` when signed out
    fn current_actor(&self) -> Option<ActorId>;
}

/// Fixed actor, e.g. a service identity
#[derive(Debug, Clone)]
pub struct StaticActor(ActorId);

impl StaticActor {
    /// Create source that always reports `actor`
    #[inline]
    #[must_use]
    pub fn new(actor: ActorId) -> Self {
        Self(actor)
    }
}

impl ActorSource for StaticActor {
    fn current_actor(&self) -> Option<ActorId> {
        Some(self.0.clone())
    }
}

/// Signed-out context
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl ActorSource for Anonymous {
    fn current_actor(&self) -> Option<ActorId> {
        None
    }
}
