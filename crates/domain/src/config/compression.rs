use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// History compression
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Controls how old tool results are shrunk before each model call.
///
/// Messages belonging to the last `keep_full_turns` user turns are sent
/// verbatim. Older tool results are classified by the tool that produced
/// them: auth tools are never touched, state tools are replaced with
/// `marker`, and everything else is truncated once it exceeds
/// `action_result_max_chars`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    #[serde(default = "d_keep_full_turns")]
    pub keep_full_turns: usize,
    #[serde(default = "d_action_max")]
    pub action_result_max_chars: usize,
    #[serde(default = "d_head")]
    pub truncate_head_chars: usize,
    /// Trailing characters kept after the truncation marker. `0` keeps
    /// the head only.
    #[serde(default)]
    pub truncate_tail_chars: usize,
    #[serde(default = "d_marker")]
    pub marker: String,
    #[serde(default = "d_truncated_marker")]
    pub truncated_marker: String,
    #[serde(default = "d_auth_tools")]
    pub auth_tools: Vec<String>,
    #[serde(default = "d_state_tools")]
    pub state_tools: Vec<String>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            keep_full_turns: d_keep_full_turns(),
            action_result_max_chars: d_action_max(),
            truncate_head_chars: d_head(),
            truncate_tail_chars: 0,
            marker: d_marker(),
            truncated_marker: d_truncated_marker(),
            auth_tools: d_auth_tools(),
            state_tools: d_state_tools(),
        }
    }
}

impl CompressionConfig {
    /// Length in chars of a truncated action result.
    pub fn truncated_len(&self) -> usize {
        self.truncate_head_chars + self.truncated_marker.chars().count() + self.truncate_tail_chars
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_keep_full_turns() -> usize {
    10
}
fn d_action_max() -> usize {
    500
}
fn d_head() -> usize {
    200
}
fn d_marker() -> String {
    "[compressed - old state data]".into()
}
fn d_truncated_marker() -> String {
    "... [truncated]".into()
}
fn d_auth_tools() -> Vec<String> {
    ["login", "register", "logout"].map(String::from).to_vec()
}
fn d_state_tools() -> Vec<String> {
    [
        "get_status",
        "get_ship",
        "get_system",
        "get_sector",
        "get_galaxy",
        "get_map",
        "get_players",
        "get_leaderboard",
        "get_market",
        "get_cargo",
        "captains_log_list",
    ]
    .map(String::from)
    .to_vec()
}
