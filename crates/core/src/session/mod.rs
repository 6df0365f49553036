//! Storage for the active token and user profile.

mod file;
mod memory;

use anyhow::Result;

pub use crate::models::Session;
pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

/// Holder of at most one authenticated session.
///
/// Implementations must be safe to share between tasks: the API client
/// reads the store before every request and clears it on a 401.
pub trait SessionStore: Send + Sync {
    /// Persist token and user together. Readers never observe one without the other.
    fn set(&self, session: Session) -> Result<()>;

    /// Current session, or `None` when either part is missing or unreadable.
    fn get(&self) -> Option<Session>;

    /// Forget the session. Clearing an empty store is a no-op.
    fn clear(&self) -> Result<()>;

    /// Token of the current session.
    fn token(&self) -> Option<String> {
        self.get().map(|session| session.token)
    }
}

pub(crate) fn is_usable(session: &Session) -> bool {
    !session.token.trim().is_empty()
}
