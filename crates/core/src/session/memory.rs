use anyhow::Result;
use parking_lot::RwLock;

use super::{is_usable, Session, SessionStore};

/// In-process session store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: RwLock<Option<Session>>,
}

impl MemorySessionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `session`.
    pub fn with_session(session: Session) -> Self {
        Self {
            inner: RwLock::new(Some(session)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn set(&self, session: Session) -> Result<()> {
        *self.inner.write() = Some(session);
        Ok(())
    }

    fn get(&self) -> Option<Session> {
        self.inner.read().clone().filter(is_usable)
    }

    fn clear(&self) -> Result<()> {
        self.inner.write().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{User, UserRole};

    fn session(token: &str) -> Session {
        Session {
            token: token.to_string(),
            user: User {
                id: 1,
                nome: "Carla".to_string(),
                email: "c@example.com".to_string(),
                telefone: None,
                cpf: None,
                endereco: None,
                tipo: UserRole::Cliente,
            },
        }
    }

    #[test]
    fn set_get_clear() -> Result<()> {
        let store = MemorySessionStore::new();
        assert!(store.get().is_none());

        store.set(session("abc"))?;
        assert_eq!(store.token().as_deref(), Some("abc"));

        store.clear()?;
        store.clear()?;
        assert!(store.get().is_none());
        Ok(())
    }

    #[test]
    fn blank_token_reads_as_absent() -> Result<()> {
        let store = MemorySessionStore::with_session(session("  "));
        assert!(store.get().is_none());
        Ok(())
    }
}
