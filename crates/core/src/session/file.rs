use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::models::User;

use super::{is_usable, Session, SessionStore};

/// Session persisted as a single JSON document on disk.
///
/// Token and user live in the same file, which is replaced through a rename,
/// so a reader sees either the previous pair or the new one.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

#[derive(Debug, Deserialize)]
struct StoredSession {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    usuario: Option<Value>,
}

impl FileSessionStore {
    /// Store backed by `path`. The file is created on the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the session file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Option<Session> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                warn!("Failed to read session {:?}: {err}", self.path);
                return None;
            }
        };

        let stored: StoredSession = match serde_json::from_str(&content) {
            Ok(stored) => stored,
            Err(err) => {
                warn!("Ignoring malformed session {:?}: {err}", self.path);
                return None;
            }
        };

        let token = stored.token?;
        let user = match serde_json::from_value::<User>(stored.usuario?) {
            Ok(user) => user,
            Err(err) => {
                warn!("Ignoring session with unreadable user {:?}: {err}", self.path);
                return None;
            }
        };
        Some(Session { token, user }).filter(is_usable)
    }

    fn write(&self, session: &Session) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;

        let serialised = serde_json::to_vec_pretty(session)?;
        let mut file = NamedTempFile::new_in(parent)
            .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
        file.write_all(&serialised)
            .context("failed to write session temp file")?;
        file.persist(&self.path)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn set(&self, session: Session) -> Result<()> {
        let _guard = self.lock.lock();
        self.write(&session)?;
        debug!(user_id = session.user.id, "session stored");
        Ok(())
    }

    fn get(&self) -> Option<Session> {
        let _guard = self.lock.lock();
        self.read()
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock();
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("session cleared");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove {}", self.path.display()))
            }
        }
    }
}
