//! Read-only view of the session's authorization state.
//!
//! Consumers receive this instead of the session manager itself, so they can
//! re-check authorization before acting on a payload without being able to
//! log in or out.

/// Single source of truth for "is this client currently authorized".
pub trait AuthStatus: Send + Sync {
    /// `true` iff a non-expired credential is held.
    fn is_authenticated(&self) -> bool;
}

/// Fixed answer, for tests and offline tools.
#[derive(Debug, Clone, Copy)]
pub struct StaticAuth(pub bool);

impl AuthStatus for StaticAuth {
    fn is_authenticated(&self) -> bool {
        self.0
    }
}
