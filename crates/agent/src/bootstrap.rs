//! Wiring: upstream connection, stores and the per-session gateway.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use ra_domain::config::Config;
use ra_domain::trace::TraceEvent;
use ra_mcp_client::{ClientInfo, HttpTransport, McpClient, McpTransport, StubTransport};
use ra_sessions::{CredentialStore, FileCredentialStore, JsonlStore, MemoryCredentialStore, MemoryStore, MessageStore};

use crate::gateway::ToolGateway;
use crate::local_tools::credential_tools;

/// Connect to the configured upstream (or the offline stub) and perform
/// the handshake.
pub async fn connect_upstream(config: &Config, offline: bool) -> anyhow::Result<Arc<McpClient>> {
    let (transport, url): (Box<dyn McpTransport>, String) = if offline {
        (Box::new(StubTransport::new()), "stub://offline".into())
    } else {
        let transport = HttpTransport::new(&config.upstream).context("building upstream transport")?;
        (Box::new(transport), config.upstream.url.clone())
    };

    let client = McpClient::new(transport).with_protocol_version(config.upstream.protocol_version.clone());
    let server = client
        .initialize(ClientInfo {
            name: config.upstream.client_name.clone(),
            version: config.upstream.client_version.clone(),
        })
        .await
        .with_context(|| format!("initializing upstream {url}"))?;

    tracing::info!(%url, server = %server.name, version = %server.version, "upstream connected");
    Ok(Arc::new(client))
}

/// Gateway for one session: credential tools bound to `session_id` plus
/// the upstream tool list.
pub async fn build_gateway(
    config: &Config,
    upstream: Option<Arc<McpClient>>,
    session_id: &str,
) -> anyhow::Result<ToolGateway> {
    let credentials = open_credential_store(config)?;
    let mut gateway = ToolGateway::new(upstream.clone());
    for tool in credential_tools(credentials, session_id) {
        gateway.register(tool);
    }

    if let Some(client) = &upstream {
        let tool_count = gateway
            .load_upstream_tools()
            .await
            .context("listing upstream tools")?;
        TraceEvent::UpstreamConnected {
            url: config.upstream.url.clone(),
            server_name: client.server_info().map(|s| s.name).unwrap_or_default(),
            tool_count,
        }
        .emit();
    }
    Ok(gateway)
}

/// `JsonlStore` under `sessions.store_dir`, or memory when unset.
pub fn open_message_store(config: &Config) -> anyhow::Result<Arc<dyn MessageStore>> {
    match &config.sessions.store_dir {
        Some(dir) => {
            let store = JsonlStore::open(Path::new(dir)).with_context(|| format!("opening message store in {dir}"))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

pub fn open_credential_store(config: &Config) -> anyhow::Result<Arc<dyn CredentialStore>> {
    match &config.sessions.store_dir {
        Some(dir) => {
            let store = FileCredentialStore::open(Path::new(dir))
                .with_context(|| format!("opening credential store in {dir}"))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryCredentialStore::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ra_domain::tool::Message;
    use serde_json::json;

    #[tokio::test]
    async fn offline_gateway_merges_stub_and_credential_tools() {
        let config = Config::default();
        let client = connect_upstream(&config, true).await.unwrap();
        assert_eq!(client.server_info().unwrap().name, "spacemolt-stub");

        let gateway = build_gateway(&config, Some(client), "s1").await.unwrap();
        let names: Vec<String> = gateway.list_tools().into_iter().map(|t| t.name).collect();
        assert!(names.contains(&"get_status".to_string()));
        assert!(names.contains(&"save_credentials".to_string()));
        assert!(names.contains(&"get_credentials".to_string()));
        assert_eq!(names.len(), 7);
    }

    #[tokio::test]
    async fn credentials_persist_under_store_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.sessions.store_dir = Some(dir.path().to_string_lossy().into_owned());

        let gateway = build_gateway(&config, None, "s1").await.unwrap();
        let saved = gateway
            .call_tool("save_credentials", json!({ "username": "pilot", "password": "hunter2" }))
            .await
            .unwrap();
        assert!(!saved.is_error);

        let reopened = build_gateway(&config, None, "s1").await.unwrap();
        let found = reopened.call_tool("get_credentials", json!({})).await.unwrap();
        assert!(found.text().contains("pilot"));

        let other = build_gateway(&config, None, "s2").await.unwrap();
        let missing = other.call_tool("get_credentials", json!({})).await.unwrap();
        assert_eq!(missing.text(), "No credentials saved for this session");
    }

    #[test]
    fn message_store_follows_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.sessions.store_dir = Some(dir.path().to_string_lossy().into_owned());

        let store = open_message_store(&config).unwrap();
        store.save_message("s1", &Message::user("hello")).unwrap();
        assert!(dir.path().join("s1.jsonl").exists());

        let memory = open_message_store(&Config::default()).unwrap();
        assert!(memory.load_messages("s1").unwrap().is_empty());
    }
}
