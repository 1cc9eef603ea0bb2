//! Display-layer callbacks.
//!
//! The turn engine reports every message it produces, in production order,
//! plus activity notifications. Rendering is the host's business.

use serde::Serialize;
use tokio::sync::mpsc;

use ra_domain::tool::Message;

/// Receives turn output. All methods have no-op defaults.
pub trait DisplaySink: Send + Sync {
    fn on_message(&self, _message: &Message) {}

    /// Called once per round, right before that round's tool calls run.
    fn on_tool_call_start(&self) {}

    fn on_reasoning(&self, _reasoning: &str) {}

    fn on_error(&self, _error: &str) {}

    fn on_warning(&self, _warning: &str) {}
}

/// Discards everything.
pub struct NullSink;

impl DisplaySink for NullSink {}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnEvent: channel-friendly form of the callbacks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum TurnEvent {
    #[serde(rename = "message")]
    Message { message: Message },

    #[serde(rename = "tool_call_start")]
    ToolCallStart,

    #[serde(rename = "reasoning")]
    Reasoning { text: String },

    #[serde(rename = "error")]
    Error { message: String },

    #[serde(rename = "warning")]
    Warning { message: String },
}

/// Forwards callbacks as [`TurnEvent`]s over an unbounded channel.
///
/// Events are dropped silently once the receiver is gone.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TurnEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TurnEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: TurnEvent) {
        let _ = self.tx.send(event);
    }
}

impl DisplaySink for ChannelSink {
    fn on_message(&self, message: &Message) {
        self.send(TurnEvent::Message {
            message: message.clone(),
        });
    }

    fn on_tool_call_start(&self) {
        self.send(TurnEvent::ToolCallStart);
    }

    fn on_reasoning(&self, reasoning: &str) {
        self.send(TurnEvent::Reasoning {
            text: reasoning.to_owned(),
        });
    }

    fn on_error(&self, error: &str) {
        self.send(TurnEvent::Error {
            message: error.to_owned(),
        });
    }

    fn on_warning(&self, warning: &str) {
        self.send(TurnEvent::Warning {
            message: warning.to_owned(),
        });
    }
}
