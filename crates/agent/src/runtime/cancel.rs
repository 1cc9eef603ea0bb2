//! Foreground turn cancellation keyed by session id.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Tracks the token of the turn currently running for each session.
#[derive(Default)]
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl CancelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a turn. The token is a child of `parent`, so cancelling
    /// either the caller's token or the map entry stops it. The entry
    /// lives as long as the returned guard.
    pub fn register(&self, session_id: &str, parent: &CancellationToken) -> Registration<'_> {
        let token = parent.child_token();
        self.tokens
            .lock()
            .insert(session_id.to_owned(), token.clone());
        Registration {
            map: self,
            session_id: session_id.to_owned(),
            token,
        }
    }

    /// Cancel the running turn. Returns `true` if one was registered.
    pub fn cancel(&self, session_id: &str) -> bool {
        match self.tokens.lock().get(session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// A registered turn. Dropping it removes the entry, including when the
/// turn's future is dropped mid-flight.
pub struct Registration<'a> {
    map: &'a CancelMap,
    session_id: String,
    token: CancellationToken,
}

impl Registration<'_> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.map.tokens.lock().remove(&self.session_id);
    }
}
