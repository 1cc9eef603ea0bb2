use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Upstream tool server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection and retry settings for the upstream tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// JSON-RPC endpoint (HTTP POST).
    #[serde(default = "d_url")]
    pub url: String,
    /// Fixed delay sequence between attempts, in seconds. The last entry
    /// is reused if `max_attempts` asks for more retries than listed.
    #[serde(default = "d_retry_delays")]
    pub retry_delays_secs: Vec<u64>,
    /// Total attempts per request, including the first one.
    #[serde(default = "d_max_attempts")]
    pub max_attempts: u32,
    /// Ceiling on a server-provided `Retry-After` delay, in seconds.
    #[serde(default = "d_max_retry_after")]
    pub max_retry_after_secs: u64,
    #[serde(default = "d_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "d_client_name")]
    pub client_name: String,
    #[serde(default = "d_client_version")]
    pub client_version: String,
    #[serde(default = "d_protocol_version")]
    pub protocol_version: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: d_url(),
            retry_delays_secs: d_retry_delays(),
            max_attempts: d_max_attempts(),
            max_retry_after_secs: d_max_retry_after(),
            request_timeout_secs: d_request_timeout(),
            client_name: d_client_name(),
            client_version: d_client_version(),
            protocol_version: d_protocol_version(),
        }
    }
}

fn d_url() -> String {
    "http://localhost:8080/mcp".into()
}
fn d_retry_delays() -> Vec<u64> {
    vec![2, 5, 10]
}
fn d_max_attempts() -> u32 {
    4
}
fn d_max_retry_after() -> u64 {
    60
}
fn d_request_timeout() -> u64 {
    30
}
fn d_client_name() -> String {
    "relay-agent".into()
}
fn d_client_version() -> String {
    env!("CARGO_PKG_VERSION").into()
}
fn d_protocol_version() -> String {
    "2024-11-05".into()
}
