//! `ra-domain`: shared types for relay-agent.
//!
//! Conversation messages, tool definitions and results, the shared error
//! type, TOML configuration and structured trace events.

pub mod config;
pub mod error;
pub mod tool;
pub mod trace;
