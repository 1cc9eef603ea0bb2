//! Tool gateway: one invocation surface over local and upstream tools.
//!
//! Local handlers win over upstream tools of the same name. Only upstream
//! dispatch goes through the transport's retry policy.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::Value;

use ra_domain::tool::{ToolDefinition, ToolResult};
use ra_domain::trace::TraceEvent;
use ra_mcp_client::{McpClient, TransportError};

use crate::local_tools::LocalTool;

#[derive(Default)]
pub struct ToolGateway {
    /// Registration order is kept so `list_tools` is deterministic.
    local: Vec<(String, Arc<dyn LocalTool>)>,
    upstream: Option<Arc<McpClient>>,
    upstream_tools: RwLock<Vec<ToolDefinition>>,
}

impl ToolGateway {
    pub fn new(upstream: Option<Arc<McpClient>>) -> Self {
        Self {
            local: Vec::new(),
            upstream,
            upstream_tools: RwLock::new(Vec::new()),
        }
    }

    /// Register a local handler. A later registration for the same name
    /// replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn LocalTool>) {
        let name = tool.definition().name;
        self.local.retain(|(n, _)| *n != name);
        tracing::debug!(tool = %name, "local tool registered");
        self.local.push((name, tool));
    }

    /// Fetch the upstream tool list and cache it. Returns the tool count.
    pub async fn load_upstream_tools(&self) -> Result<usize, TransportError> {
        let Some(client) = &self.upstream else {
            return Ok(0);
        };
        let tools = client.list_tools().await?;
        let count = tools.len();
        *self.upstream_tools.write() = tools;
        tracing::info!(tool_count = count, "upstream tools loaded");
        Ok(count)
    }

    fn local_handler(&self, name: &str) -> Option<&Arc<dyn LocalTool>> {
        self.local.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    /// Union of upstream and local tools; local entries shadow upstream
    /// entries with the same name.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        let mut tools: Vec<ToolDefinition> = self
            .upstream_tools
            .read()
            .iter()
            .filter(|t| self.local_handler(&t.name).is_none())
            .cloned()
            .collect();
        tools.extend(self.local.iter().map(|(_, t)| t.definition()));
        tools
    }

    /// Dispatch one call. `Err` only for upstream transport failures.
    pub async fn call_tool(&self, name: &str, args: Value) -> Result<ToolResult, TransportError> {
        let start = Instant::now();

        let (result, local) = if let Some(tool) = self.local_handler(name) {
            (tool.call(args).await, true)
        } else if let Some(client) = &self.upstream {
            (client.call_tool(name, args).await?, false)
        } else {
            (ToolResult::error(format!("Unknown tool: {name}")), true)
        };

        TraceEvent::ToolDispatched {
            tool_name: name.to_owned(),
            local,
            is_error: result.is_error,
            duration_ms: start.elapsed().as_millis() as u64,
        }
        .emit();

        Ok(result)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
