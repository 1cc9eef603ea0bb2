//! Offline stub transport with canned game-state replies.
//!
//! Lets the agent run without a reachable upstream (`--offline`). Every
//! reply reports tick 42 so runs are reproducible.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::protocol::JsonRpcResponse;
use crate::transport::{McpTransport, TransportError};

const STUB_TICK: u64 = 42;

/// Answers `initialize`, `tools/list` and `tools/call` locally.
#[derive(Debug, Default)]
pub struct StubTransport {
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn tools() -> Value {
        let empty = json!({ "type": "object", "properties": {} });
        json!({ "tools": [
            { "name": "get_status", "description": "Get player, ship and location status", "inputSchema": empty },
            { "name": "get_system", "description": "Describe the current star system", "inputSchema": empty },
            { "name": "get_ship", "description": "Get ship details and cargo", "inputSchema": empty },
            { "name": "get_poi", "description": "Describe the current point of interest", "inputSchema": empty },
            { "name": "get_notifications", "description": "Fetch pending notifications", "inputSchema": empty },
        ] })
    }

    fn call(name: &str) -> Value {
        let payload = match name {
            "get_status" => json!({
                "player": { "username": "stub_pilot", "credits": 1000 },
                "ship": { "name": "Stub Runner", "hull": 100, "fuel": 80 },
                "location": { "system": "Sol", "poi": "Earth Station" },
            }),
            "get_system" => json!({
                "system": { "name": "Sol", "security": "high" },
                "pois": ["Earth Station", "Asteroid Belt"],
            }),
            "get_ship" => json!({
                "ship": { "name": "Stub Runner", "class": "shuttle", "cargo_capacity": 50 },
                "cargo": [],
            }),
            "get_poi" => json!({
                "poi": { "name": "Earth Station", "type": "station", "services": ["market", "repair"] },
            }),
            "get_notifications" => json!({ "notifications": [] }),
            other => {
                return json!({
                    "content": [{ "type": "text", "text": format!("Unknown tool: {other}") }],
                    "isError": true,
                });
            }
        };

        let mut doc = payload;
        if let Value::Object(map) = &mut doc {
            map.insert("current_tick".into(), json!(STUB_TICK));
        }
        json!({
            "content": [{ "type": "text", "text": doc.to_string() }],
            "isError": false,
        })
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl McpTransport for StubTransport {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
        self.ensure_open()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let resp = match method {
            "initialize" => JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "spacemolt-stub", "version": "0.0.0" },
                }),
            ),
            "tools/list" => JsonRpcResponse::success(id, Self::tools()),
            "tools/call" => {
                let name = params
                    .as_ref()
                    .and_then(|p| p.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                JsonRpcResponse::success(id, Self::call(name))
            }
            other => JsonRpcResponse::failure(id, -32601, format!("method not found: {other}")),
        };
        Ok(resp)
    }

    async fn send_notification(&self, _method: &str, _params: Option<Value>) -> Result<(), TransportError> {
        self.ensure_open()
    }

    fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
