//! Tools implemented in-process.
//!
//! Each handler is constructed for one session and captures its
//! session-scoped dependencies, so the session id never appears in a
//! model-visible parameter.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use ra_domain::tool::{ToolDefinition, ToolResult};
use ra_sessions::{CredentialStore, Credentials};

/// Implement this trait to expose an in-process tool through the gateway.
///
/// Failures are reported as `ToolResult::error` so the model can react;
/// local tools are never retried.
#[async_trait::async_trait]
pub trait LocalTool: Send + Sync + 'static {
    fn definition(&self) -> ToolDefinition;

    async fn call(&self, args: Value) -> ToolResult;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Credential tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SaveCredentialsTool {
    store: Arc<dyn CredentialStore>,
    session_id: String,
}

impl SaveCredentialsTool {
    pub fn new(store: Arc<dyn CredentialStore>, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SaveCredentialsArgs {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[async_trait::async_trait]
impl LocalTool for SaveCredentialsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "save_credentials".into(),
            description: "Save your game login credentials so they can be recovered later with get_credentials. \
                          Call this right after registering or logging in."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "username": { "type": "string", "description": "Game username" },
                    "password": { "type": "string", "description": "Game password" }
                },
                "required": ["username", "password"]
            }),
        }
    }

    async fn call(&self, args: Value) -> ToolResult {
        let args: SaveCredentialsArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("Invalid arguments: {e}")),
        };
        if args.username.trim().is_empty() {
            return ToolResult::error("Username cannot be empty");
        }
        if args.password.is_empty() {
            return ToolResult::error("Password cannot be empty");
        }

        let username = args.username.clone();
        let creds = Credentials {
            username: args.username,
            password: args.password,
        };
        match self.store.save_credentials(&self.session_id, creds) {
            Ok(()) => {
                tracing::info!(session_id = %self.session_id, %username, "credentials saved");
                ToolResult::ok(format!("Credentials saved successfully for user '{username}'"))
            }
            Err(e) => ToolResult::error(format!("Failed to save credentials: {e}")),
        }
    }
}

pub struct GetCredentialsTool {
    store: Arc<dyn CredentialStore>,
    session_id: String,
}

impl GetCredentialsTool {
    pub fn new(store: Arc<dyn CredentialStore>, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
        }
    }
}

#[async_trait::async_trait]
impl LocalTool for GetCredentialsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_credentials".into(),
            description: "Retrieve the game credentials saved for this session, if any.".into(),
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn call(&self, _args: Value) -> ToolResult {
        match self.store.get_credentials(&self.session_id) {
            Ok(Some(creds)) => ToolResult::ok(
                json!({ "username": creds.username, "password": creds.password }).to_string(),
            ),
            Ok(None) => ToolResult::ok("No credentials saved for this session"),
            Err(e) => ToolResult::error(format!("Failed to load credentials: {e}")),
        }
    }
}

/// Both credential tools bound to `session_id`.
pub fn credential_tools(store: Arc<dyn CredentialStore>, session_id: &str) -> Vec<Arc<dyn LocalTool>> {
    vec![
        Arc::new(SaveCredentialsTool::new(store.clone(), session_id)),
        Arc::new(GetCredentialsTool::new(store, session_id)),
    ]
}
