//! Per-session single-flight.
//!
//! A user-driven turn and an autoplay turn for the same session never run
//! at the same time: the second one waits for the first to finish.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as TurnMutex, OwnedMutexGuard};

/// Each session id maps to an async mutex. Holding the guard grants
/// exclusive access for one turn; dropping it releases the session.
#[derive(Default)]
pub struct SessionLockMap {
    locks: Mutex<HashMap<String, Arc<TurnMutex<()>>>>,
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the session is free and take it.
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .entry(session_id.to_owned())
            .or_default()
            .clone();
        lock.lock_owned().await
    }
}
