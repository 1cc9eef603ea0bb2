//! History compression: shrink old tool results before each model call.
//!
//! - Only `Tool` role messages before the cutoff are touched
//! - User, assistant and system messages are never altered
//! - The last `keep_full_turns` user turns are kept verbatim
//! - Auth tool results are never altered
//! - State tool results are replaced with a fixed marker
//! - Other (action) tool results are truncated once they exceed a size threshold
//!
//! The result depends only on message positions and the tool that produced
//! each result, so compressing twice gives the same output as compressing once.

use std::collections::HashMap;

use ra_domain::config::CompressionConfig;
use ra_domain::tool::{Message, Role};

/// Approximate characters per token.
const CHARS_PER_TOKEN: usize = 4;
/// Fixed per-message overhead in tokens.
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// How an old tool result is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    Auth,
    State,
    Action,
}

pub struct HistoryCompressor {
    config: CompressionConfig,
}

impl HistoryCompressor {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Case-insensitive classification by tool name.
    pub fn classify(&self, tool_name: &str) -> ToolCategory {
        let matches = |list: &[String]| list.iter().any(|t| t.eq_ignore_ascii_case(tool_name));
        if matches(&self.config.auth_tools) {
            ToolCategory::Auth
        } else if matches(&self.config.state_tools) {
            ToolCategory::State
        } else {
            ToolCategory::Action
        }
    }

    /// Return a compressed copy of `messages`. The input is never mutated.
    pub fn compress(&self, messages: &[Message], keep_full_turns: usize) -> Vec<Message> {
        let cutoff = match find_cutoff(messages, keep_full_turns) {
            Some(c) => c,
            None => return messages.to_vec(),
        };

        // call id -> tool name, as of the message being visited. A later
        // assistant reusing an id shadows the earlier one.
        let mut producers: HashMap<&str, &str> = HashMap::new();
        let mut result = Vec::with_capacity(messages.len());

        for (i, msg) in messages.iter().enumerate() {
            if msg.role == Role::Assistant {
                for call in msg.calls() {
                    producers.insert(call.id.as_str(), call.name.as_str());
                }
            }

            if i >= cutoff || msg.role != Role::Tool {
                result.push(msg.clone());
                continue;
            }

            let tool_name = msg
                .tool_call_id
                .as_deref()
                .and_then(|id| producers.get(id).copied())
                .unwrap_or("");

            let content = match self.classify(tool_name) {
                ToolCategory::Auth => None,
                ToolCategory::State => Some(self.config.marker.clone()),
                ToolCategory::Action => self.truncate(&msg.content),
            };

            match content {
                Some(content) => {
                    let mut compressed = msg.clone();
                    compressed.content = content;
                    result.push(compressed);
                }
                None => result.push(msg.clone()),
            }
        }

        result
    }

    /// `None` when the content is within the threshold.
    fn truncate(&self, content: &str) -> Option<String> {
        let len = content.chars().count();
        if len <= self.config.action_result_max_chars {
            return None;
        }

        let head: String = content.chars().take(self.config.truncate_head_chars).collect();
        let mut out = head;
        out.push_str(&self.config.truncated_marker);
        if self.config.truncate_tail_chars > 0 {
            let skip = len.saturating_sub(self.config.truncate_tail_chars);
            out.extend(content.chars().skip(skip));
        }
        Some(out)
    }
}

/// Index of the first message of the kept window, or `None` when nothing
/// needs compressing.
fn find_cutoff(messages: &[Message], keep_full_turns: usize) -> Option<usize> {
    let turns = messages.iter().filter(|m| m.role == Role::User).count();
    if turns <= keep_full_turns {
        return None;
    }
    if keep_full_turns == 0 {
        return Some(messages.len());
    }

    let mut seen = 0;
    for (i, msg) in messages.iter().enumerate().rev() {
        if msg.role == Role::User {
            seen += 1;
            if seen == keep_full_turns {
                return Some(i);
            }
        }
    }
    None
}

/// Rough token estimate for logging.
pub fn estimate_token_count(messages: &[Message]) -> usize {
    messages
        .iter()
        .map(|m| {
            let calls = m
                .tool_calls
                .as_ref()
                .and_then(|c| serde_json::to_string(c).ok())
                .map(|s| s.len())
                .unwrap_or(0);
            m.content.len() / CHARS_PER_TOKEN + calls / CHARS_PER_TOKEN + MESSAGE_OVERHEAD_TOKENS
        })
        .sum()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
