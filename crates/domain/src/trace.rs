use serde::Serialize;

/// Structured trace events emitted across all relay-agent crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    UpstreamConnected {
        url: String,
        server_name: String,
        tool_count: usize,
    },
    UpstreamRetry {
        method: String,
        attempt: u32,
        delay_ms: u64,
        rate_limited: bool,
        reason: String,
    },
    ToolDispatched {
        tool_name: String,
        local: bool,
        is_error: bool,
        duration_ms: u64,
    },
    HistoryCompressed {
        messages: usize,
        tokens_before: usize,
        tokens_after: usize,
    },
    TurnFinished {
        session_id: String,
        rounds: u32,
        messages_emitted: usize,
        outcome: String,
    },
    AutoplayStateChanged {
        session_id: String,
        running: bool,
        reason: String,
    },
    MessagePersisted {
        session_id: String,
        role: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "ra_event");
    }
}
