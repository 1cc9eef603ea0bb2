//! Model backend contract.
//!
//! The HTTP body format of any concrete model API is out of scope for this
//! crate; hosts plug in an adapter implementing [`ModelBackend`].

use ra_domain::tool::{Message, ToolCall, ToolDefinition};

/// One model reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    /// Textual content of the response.
    pub content: String,
    /// Reasoning trace, when the model exposes one.
    pub reasoning: Option<String>,
    /// Tool calls emitted by the model. Empty means a final answer.
    pub tool_calls: Vec<ToolCall>,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn tools(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("model backend transport: {0}")]
    Transport(String),

    #[error("model backend auth: {0}")]
    Auth(String),

    #[error("model backend returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Trait that every model adapter must implement.
#[async_trait::async_trait]
pub trait ModelBackend: Send + Sync {
    /// Send the (compressed) history plus the available tools and wait for
    /// the full reply.
    async fn chat_with_tools(
        &self,
        history: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse, BackendError>;
}
