//! Fakes shared by the unit tests of this crate.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use ra_domain::tool::{Message, ToolCall, ToolDefinition, ToolResult};

use crate::backend::{BackendError, ChatResponse, ModelBackend};
use crate::local_tools::LocalTool;

/// Replays canned responses in order, then keeps answering with
/// `fallback` (or a final "done" answer when there is none).
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<ChatResponse, BackendError>>>,
    fallback: Option<ChatResponse>,
    /// Every history the backend was called with.
    pub seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<ChatResponse, BackendError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// A backend that requests `tool` forever.
    pub fn looping(tool: &str) -> Self {
        Self {
            fallback: Some(ChatResponse::tools(vec![call("loop", tool)])),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }
}

#[async_trait::async_trait]
impl ModelBackend for ScriptedBackend {
    async fn chat_with_tools(
        &self,
        history: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<ChatResponse, BackendError> {
        self.seen.lock().push(history.to_vec());
        match self.script.lock().pop_front() {
            Some(next) => next,
            None => Ok(self
                .fallback
                .clone()
                .unwrap_or_else(|| ChatResponse::text("done"))),
        }
    }
}

/// Never answers.
pub struct HangingBackend;

#[async_trait::async_trait]
impl ModelBackend for HangingBackend {
    async fn chat_with_tools(
        &self,
        _history: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<ChatResponse, BackendError> {
        std::future::pending().await
    }
}

/// Local tool that records its invocations into a shared log.
pub struct RecordingTool {
    pub name: &'static str,
    pub reply: ToolResult,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl RecordingTool {
    pub fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            reply: ToolResult::ok(format!("{name} ok")),
            log: log.clone(),
        })
    }
}

#[async_trait::async_trait]
impl LocalTool for RecordingTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.into(),
            description: String::new(),
            parameters: json!({ "type": "object" }),
        }
    }

    async fn call(&self, _args: Value) -> ToolResult {
        self.log.lock().push(self.name.to_owned());
        self.reply.clone()
    }
}

pub fn call(id: &str, name: &str) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: name.into(),
        arguments: json!({}),
    }
}

/// Every tool message answers a call made by an earlier assistant message.
pub fn assert_no_orphans(history: &[Message]) {
    let mut seen = std::collections::HashSet::new();
    for msg in history {
        for c in msg.calls() {
            seen.insert(c.id.clone());
        }
        if let Some(id) = &msg.tool_call_id {
            assert!(seen.contains(id), "orphan tool result {id}");
        }
    }
}
