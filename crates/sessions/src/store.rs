//! Message store contract and the in-memory implementation.

use std::collections::HashMap;

use parking_lot::RwLock;

use ra_domain::error::{Error, Result};
use ra_domain::tool::Message;

/// Persistent history for sessions.
///
/// Used only at turn boundaries and once per produced message, never
/// inside the model/tool loop.
pub trait MessageStore: Send + Sync {
    /// Append one message to a session's history.
    fn save_message(&self, session_id: &str, message: &Message) -> Result<()>;

    /// Full history of a session, oldest first. Unknown sessions are empty.
    fn load_messages(&self, session_id: &str) -> Result<Vec<Message>>;
}

/// Session ids end up in file names, so keep them to a safe alphabet.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    let ok = !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
        && session_id != "."
        && session_id != "..";
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidSessionId(session_id.to_owned()))
    }
}

/// Volatile store, used when no store directory is configured and in tests.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Vec<Message>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageStore for MemoryStore {
    fn save_message(&self, session_id: &str, message: &Message) -> Result<()> {
        self.sessions
            .write()
            .entry(session_id.to_owned())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    fn load_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        Ok(self.sessions.read().get(session_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_keeps_sessions_apart() {
        let store = MemoryStore::new();
        store.save_message("a", &Message::user("hello")).unwrap();
        store.save_message("a", &Message::assistant("hi")).unwrap();
        store.save_message("b", &Message::user("other")).unwrap();

        let a = store.load_messages("a").unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[1].content, "hi");
        assert_eq!(store.load_messages("b").unwrap().len(), 1);
        assert!(store.load_messages("missing").unwrap().is_empty());
    }

    #[test]
    fn session_id_validation() {
        assert!(validate_session_id("default").is_ok());
        assert!(validate_session_id("cli:run-2").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("..").is_err());
        assert!(validate_session_id("../etc/passwd").is_err());
        assert!(validate_session_id("a/b").is_err());
    }
}
