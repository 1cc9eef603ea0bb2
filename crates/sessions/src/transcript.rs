//! Append-only JSONL message histories.
//!
//! Each session gets a `<session_id>.jsonl` file under the store directory.
//! Every message is appended as a single JSON line.
//!
//! Includes an in-memory write-through cache so a session file is read
//! from disk at most once per process.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use ra_domain::error::{Error, Result};
use ra_domain::tool::Message;
use ra_domain::trace::TraceEvent;

use crate::store::{validate_session_id, MessageStore};

/// File-backed [`MessageStore`].
pub struct JsonlStore {
    base_dir: PathBuf,
    cache: RwLock<HashMap<String, Vec<Message>>>,
}

impl JsonlStore {
    /// Open (creating if needed) a store rooted at `base_dir`.
    pub fn open(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir).map_err(Error::Io)?;
        tracing::info!(path = %base_dir.display(), "message store opened");
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self.base_dir.join(format!("{session_id}.jsonl")))
    }

    /// Invalidate the cache for a session (e.g. after the file was edited
    /// outside this process).
    pub fn invalidate_cache(&self, session_id: &str) {
        self.cache.write().remove(session_id);
    }
}

impl MessageStore for JsonlStore {
    fn save_message(&self, session_id: &str, message: &Message) -> Result<()> {
        let path = self.path_for(session_id)?;
        let mut line = serde_json::to_string(message)
            .map_err(Error::Json)?;
        line.push('\n');

        // Write to disk first; only update cache if I/O succeeds.
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(Error::Io)?;
        file.write_all(line.as_bytes()).map_err(Error::Io)?;

        {
            let mut cache = self.cache.write();
            if let Some(lines) = cache.get_mut(session_id) {
                lines.push(message.clone());
            }
        }

        TraceEvent::MessagePersisted {
            session_id: session_id.to_owned(),
            role: message.role.as_str().to_owned(),
        }
        .emit();

        Ok(())
    }

    fn load_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        {
            let cache = self.cache.read();
            if let Some(messages) = cache.get(session_id) {
                return Ok(messages.clone());
            }
        }

        let path = self.path_for(session_id)?;
        let messages = read_jsonl_file(&path, session_id)?;
        self.cache.write().insert(session_id.to_owned(), messages.clone());
        Ok(messages)
    }
}

/// Read and parse a JSONL history file.
fn read_jsonl_file(path: &Path, session_id: &str) -> Result<Vec<Message>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
    let mut messages = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Message>(line) {
            Ok(m) => messages.push(m),
            Err(e) => {
                tracing::warn!(
                    session_id = session_id,
                    error = %e,
                    "skipping malformed history line"
                );
            }
        }
    }
    Ok(messages)
}
