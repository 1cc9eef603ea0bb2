//! Session-scoped persistence for relay-agent.
//!
//! Message histories (in memory or as append-only JSONL files) and the
//! per-session credential store behind the local credential tools.

pub mod credentials;
pub mod store;
pub mod transcript;

pub use credentials::{CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore};
pub use store::{MemoryStore, MessageStore};
pub use transcript::JsonlStore;
