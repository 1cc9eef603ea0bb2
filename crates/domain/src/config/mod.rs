mod agent;
mod compression;
mod observability;
mod upstream;

pub use agent::*;
pub use compression::*;
pub use observability::*;
pub use upstream::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub turn: TurnConfig,
    #[serde(default)]
    pub autoplay: AutoplayConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Directory holding `<session_id>.jsonl` histories. When unset,
    /// history lives in memory only.
    #[serde(default)]
    pub store_dir: Option<String>,
    #[serde(default = "d_session_id")]
    pub default_session: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            store_dir: None,
            default_session: d_session_id(),
        }
    }
}

fn d_session_id() -> String {
    "default".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut push = |severity, field: &str, message: String| {
            errors.push(ConfigError {
                severity,
                field: field.into(),
                message,
            });
        };

        if self.upstream.url.is_empty() {
            push(ConfigSeverity::Error, "upstream.url", "url must not be empty".into());
        }
        if self.upstream.max_attempts == 0 {
            push(
                ConfigSeverity::Error,
                "upstream.max_attempts",
                "at least one attempt is required".into(),
            );
        }
        if self.upstream.max_attempts > 1 && self.upstream.retry_delays_secs.is_empty() {
            push(
                ConfigSeverity::Error,
                "upstream.retry_delays_secs",
                "retries are enabled but no delays are configured".into(),
            );
        }

        if self.turn.max_rounds == 0 {
            push(ConfigSeverity::Error, "turn.max_rounds", "must be greater than 0".into());
        }

        // A truncated result that is still over the threshold would be
        // truncated again on the next pass.
        let c = &self.compression;
        if c.truncated_len() > c.action_result_max_chars {
            push(
                ConfigSeverity::Error,
                "compression.truncate_head_chars",
                format!(
                    "truncated output ({} chars) exceeds action_result_max_chars ({})",
                    c.truncated_len(),
                    c.action_result_max_chars
                ),
            );
        }
        if c.keep_full_turns == 0 {
            push(
                ConfigSeverity::Warning,
                "compression.keep_full_turns",
                "0 compresses every turn, including the current one".into(),
            );
        }

        if self.autoplay.interval_secs == 0 {
            push(
                ConfigSeverity::Warning,
                "autoplay.interval_secs",
                "0 runs autoplay turns back to back".into(),
            );
        }
        if self.autoplay.max_consecutive_errors == 0 {
            push(
                ConfigSeverity::Error,
                "autoplay.max_consecutive_errors",
                "must be greater than 0".into(),
            );
        }

        errors
    }
}
