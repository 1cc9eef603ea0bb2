use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Model calls allowed per turn before the turn is aborted.
    #[serde(default = "d_max_rounds")]
    pub max_rounds: u32,
    /// Prepended once to every session history when non-empty.
    #[serde(default)]
    pub system_prompt: String,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_rounds: d_max_rounds(),
            system_prompt: String::new(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Autoplay
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Recurring synthetic turns. The default interval assumes roughly ten
/// tool calls per turn against a 10 s server tick, with 25% slack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoplayConfig {
    #[serde(default = "d_interval")]
    pub interval_secs: u64,
    #[serde(default = "d_max_errors")]
    pub max_consecutive_errors: u32,
}

impl Default for AutoplayConfig {
    fn default() -> Self {
        Self {
            interval_secs: d_interval(),
            max_consecutive_errors: d_max_errors(),
        }
    }
}

fn d_max_rounds() -> u32 {
    20
}
fn d_interval() -> u64 {
    75
}
fn d_max_errors() -> u32 {
    3
}
