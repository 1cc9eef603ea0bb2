//! `ra-mcp-client`: upstream tool server client for relay-agent.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types (`initialize`, `tools/list`, `tools/call`).
//! - SSE event reassembly for streamed responses.
//! - A fixed-sequence retry policy that honors `Retry-After` hints.
//! - An HTTP transport and an offline stub transport.
//! - [`McpClient`], the handshake / discovery / invocation surface used by
//!   the tool gateway.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ra_mcp_client::{HttpTransport, McpClient, RetryPolicy};
//!
//! let transport = HttpTransport::new(&config.upstream)?;
//! let client = McpClient::new(Box::new(transport));
//! client.initialize(client_info).await?;
//! let tools = client.list_tools().await?;
//! let result = client.call_tool("get_status", json!({})).await?;
//! ```

pub mod client;
pub mod protocol;
pub mod retry;
pub mod sse;
pub mod stub;
pub mod transport;

// Re-exports for convenience.
pub use client::McpClient;
pub use protocol::{ClientInfo, McpToolDef, ServerInfo};
pub use retry::RetryPolicy;
pub use stub::StubTransport;
pub use transport::{HttpTransport, McpTransport, TransportError};
