//! Upstream client: handshake, tool discovery and tool invocation on top
//! of an [`McpTransport`].

use parking_lot::Mutex;
use serde_json::Value;

use ra_domain::tool::{ToolDefinition, ToolResult};

use crate::protocol::{self, ClientInfo, InitializeResult, ServerInfo, ToolsListResult};
use crate::transport::{McpTransport, TransportError};

/// A connection to one upstream tool server.
pub struct McpClient {
    transport: Box<dyn McpTransport>,
    protocol_version: String,
    server_info: Mutex<Option<ServerInfo>>,
}

impl McpClient {
    pub fn new(transport: Box<dyn McpTransport>) -> Self {
        Self {
            transport,
            protocol_version: "2024-11-05".into(),
            server_info: Mutex::new(None),
        }
    }

    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    /// Server identity from the last successful `initialize`.
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.lock().clone()
    }

    /// Perform the handshake: `initialize`, then `notifications/initialized`.
    pub async fn initialize(&self, client_info: ClientInfo) -> Result<ServerInfo, TransportError> {
        let params = serde_json::to_value(protocol::initialize_params(&self.protocol_version, client_info))?;
        let resp = self.transport.send_request("initialize", Some(params)).await?;

        let value = resp
            .into_result()
            .map_err(|err| TransportError::Protocol(format!("initialize failed: {err}")))?;
        let result: InitializeResult = serde_json::from_value(value)
            .map_err(|e| TransportError::Protocol(format!("failed to parse initialize result: {e}")))?;

        tracing::debug!(server = %result.server_info.name, "initialize response received");

        self.notify("notifications/initialized", None).await?;

        tracing::info!(
            server = %result.server_info.name,
            server_version = %result.server_info.version,
            protocol_version = %result.protocol_version,
            "upstream initialized"
        );

        *self.server_info.lock() = Some(result.server_info.clone());
        Ok(result.server_info)
    }

    /// Fire-and-forget notification.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        self.transport.send_notification(method, params).await
    }

    /// Discover the upstream tool set.
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>, TransportError> {
        let resp = self.transport.send_request("tools/list", None).await?;
        let value = resp
            .into_result()
            .map_err(|err| TransportError::Protocol(format!("tools/list failed: {err}")))?;
        let result: ToolsListResult = serde_json::from_value(value)
            .map_err(|e| TransportError::Protocol(format!("failed to parse tools/list result: {e}")))?;
        Ok(result.tools.into_iter().map(Into::into).collect())
    }

    /// Invoke a tool.
    ///
    /// A JSON-RPC error in the reply is a tool failure, returned as a
    /// [`ToolResult`] with `is_error` set. Only transport failures are `Err`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult, TransportError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });
        let resp = self.transport.send_request("tools/call", Some(params)).await?;

        match resp.into_result() {
            Ok(value) => serde_json::from_value::<ToolResult>(value)
                .map_err(|e| TransportError::Protocol(format!("failed to parse tools/call result: {e}"))),
            Err(err) => {
                tracing::debug!(tool = name, code = err.code, message = %err.message, "tool returned RPC error");
                Ok(ToolResult::error(err.message))
            }
        }
    }

    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    /// Close the connection. Idempotent.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.transport.shutdown().await;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
