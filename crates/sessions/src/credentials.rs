//! Per-session game credentials.
//!
//! Backs the `save_credentials` / `get_credentials` local tools. The file
//! store persists every session's credentials in one `credentials.json`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use ra_domain::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

pub trait CredentialStore: Send + Sync {
    /// Save (or replace) the credentials of a session.
    fn save_credentials(&self, session_id: &str, credentials: Credentials) -> Result<()>;

    /// `None` when the session has nothing saved.
    fn get_credentials(&self, session_id: &str) -> Result<Option<Credentials>>;
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save_credentials(&self, session_id: &str, credentials: Credentials) -> Result<()> {
        self.entries.write().insert(session_id.to_owned(), credentials);
        Ok(())
    }

    fn get_credentials(&self, session_id: &str) -> Result<Option<Credentials>> {
        Ok(self.entries.read().get(session_id).cloned())
    }
}

/// JSON-file credential store, flushed on every save.
pub struct FileCredentialStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, Credentials>>,
}

impl FileCredentialStore {
    /// Load or create `dir/credentials.json`.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(Error::Io)?;
        let path = dir.join("credentials.json");
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw)
                .map_err(|e| Error::Store(format!("parsing {}: {e}", path.display())))?
        } else {
            HashMap::new()
        };

        tracing::debug!(sessions = entries.len(), path = %path.display(), "credential store loaded");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    fn flush(&self, entries: &HashMap<String, Credentials>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(Error::Json)?;
        std::fs::write(&self.path, json).map_err(Error::Io)
    }
}

impl CredentialStore for FileCredentialStore {
    fn save_credentials(&self, session_id: &str, credentials: Credentials) -> Result<()> {
        let mut entries = self.entries.write();
        let previous = entries.insert(session_id.to_owned(), credentials);
        if let Err(e) = self.flush(&entries) {
            // Keep memory and disk in agreement.
            match previous {
                Some(old) => entries.insert(session_id.to_owned(), old),
                None => entries.remove(session_id),
            };
            return Err(e);
        }
        Ok(())
    }

    fn get_credentials(&self, session_id: &str) -> Result<Option<Credentials>> {
        Ok(self.entries.read().get(session_id).cloned())
    }
}
