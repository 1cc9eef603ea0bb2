//! Upstream transport layer.
//!
//! - **Http**: one JSON-RPC document per POST; the reply is a JSON body or
//!   an SSE stream. Transient failures are retried per [`RetryPolicy`].
//! - **Stub**: offline canned replies, see [`crate::stub`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;

use ra_domain::config::UpstreamConfig;

use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::retry::{self, Attempt, RetryPolicy};
use crate::sse::SseDecoder;

/// Header carrying the protocol session assigned by the server.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Trait for upstream transports.
///
/// Dropping a returned future abandons the request; callers use that to
/// honor their own cancellation.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a JSON-RPC request and wait for the corresponding response.
    ///
    /// A response carrying a JSON-RPC `error` is `Ok`: it is a valid
    /// envelope, not a transport failure.
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError>;

    /// Send a JSON-RPC notification (no response expected).
    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<(), TransportError>;

    /// Check if the transport is still usable.
    fn is_alive(&self) -> bool;

    /// Shut down the transport. Safe to call more than once.
    async fn shutdown(&self);
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream rate limited the request (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport is closed")]
    Closed,

    #[error("timeout waiting for response")]
    Timeout,

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<TransportError>,
    },
}

fn from_reqwest(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Http(e.to_string())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// HTTP transport: POSTs JSON-RPC documents to a single endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    policy: RetryPolicy,
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl HttpTransport {
    pub fn new(config: &UpstreamConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(from_reqwest)?;
        Ok(Self::with_client(client, &config.url, RetryPolicy::from_config(config)))
    }

    pub fn with_client(client: reqwest::Client, url: &str, policy: RetryPolicy) -> Self {
        Self {
            client,
            url: url.to_owned(),
            policy,
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Protocol session id captured from the server, if any.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    async fn post(&self, body: String) -> Result<reqwest::Response, TransportError> {
        let mut req = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream")
            .body(body);
        if let Some(sid) = self.session_id() {
            req = req.header(SESSION_HEADER, sid);
        }
        let resp = req.send().await.map_err(from_reqwest)?;
        if let Some(sid) = resp.headers().get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
            *self.session_id.lock() = Some(sid.to_owned());
        }
        Ok(resp)
    }

    /// One POST + read cycle, classified for the retry loop.
    async fn attempt_request(&self, id: u64, body: &str) -> Attempt<JsonRpcResponse> {
        if let Err(e) = self.ensure_open() {
            return Attempt::Fatal(e);
        }

        let resp = match self.post(body.to_owned()).await {
            Ok(r) => r,
            Err(e) => return transient(e),
        };
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after_header(resp.headers());
            return Attempt::Retry {
                reason: "HTTP 429".into(),
                rate_limited: true,
                retry_after,
                last: Err(TransportError::RateLimited { retry_after }),
            };
        }

        let parsed = read_response(resp, id).await;

        if !status.is_success() {
            // A structured reply on an error status is still a reply.
            return match parsed {
                Ok(Some(envelope)) if envelope.is_error() => classify(envelope),
                _ => transient(TransportError::Status {
                    status: status.as_u16(),
                    body: status.canonical_reason().unwrap_or_default().to_owned(),
                }),
            };
        }

        match parsed {
            Ok(Some(envelope)) => classify(envelope),
            Ok(None) => transient(TransportError::Protocol(format!(
                "no response for request id {id}"
            ))),
            Err(e @ TransportError::Json(_)) | Err(e @ TransportError::Protocol(_)) => Attempt::Fatal(e),
            Err(e) => transient(e),
        }
    }
}

fn transient<T>(e: TransportError) -> Attempt<T> {
    Attempt::Retry {
        reason: e.to_string(),
        rate_limited: false,
        retry_after: None,
        last: Err(e),
    }
}

/// Structured rate-limit errors are retried; every other envelope is final.
fn classify(envelope: JsonRpcResponse) -> Attempt<JsonRpcResponse> {
    match &envelope.error {
        Some(err) if err.is_rate_limit() => Attempt::Retry {
            reason: err.message.clone(),
            rate_limited: true,
            retry_after: err.retry_after(),
            last: Ok(envelope),
        },
        _ => Attempt::Done(envelope),
    }
}

fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(retry::parse_retry_after)
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("text/event-stream"))
        .unwrap_or(false)
}

/// Read the reply for request `id`.
///
/// SSE bodies are consumed chunk by chunk and the read stops at the first
/// event whose `id` matches; server notifications in between are skipped.
/// An empty JSON body yields `Ok(None)`.
async fn read_response(resp: reqwest::Response, id: u64) -> Result<Option<JsonRpcResponse>, TransportError> {
    if !is_event_stream(resp.headers()) {
        let body = resp.text().await.map_err(from_reqwest)?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        return Ok(Some(serde_json::from_str(&body)?));
    }

    let mut decoder = SseDecoder::new();
    let mut stream = resp.bytes_stream();
    loop {
        let events = match stream.next().await {
            Some(chunk) => decoder.push(&chunk.map_err(from_reqwest)?),
            None => {
                let tail = decoder.finish();
                if let Some(found) = match_event(tail, id) {
                    return Ok(Some(found));
                }
                return Ok(None);
            }
        };
        if let Some(found) = match_event(events, id) {
            return Ok(Some(found));
        }
    }
}

fn match_event(events: Vec<String>, id: u64) -> Option<JsonRpcResponse> {
    events.into_iter().find_map(|data| match serde_json::from_str::<JsonRpcResponse>(&data) {
        Ok(resp) if resp.id == Some(id) => Some(resp),
        Ok(_) => {
            tracing::debug!(expected_id = id, "skipping non-matching SSE event");
            None
        }
        Err(e) => {
            tracing::debug!(error = %e, "skipping unparseable SSE event");
            None
        }
    })
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
        self.ensure_open()?;
        let id = self.next_request_id();
        let body = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        tracing::debug!(id, method, "sending upstream request");
        let body = body.as_str();
        let this = self;
        retry::run_with_retry(&self.policy, method, move |_| this.attempt_request(id, body)).await
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        self.ensure_open()?;
        let body = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        tracing::debug!(method, "sending upstream notification");

        let resp = self.post(body).await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            })
        }
    }

    fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(url = %self.url, "upstream transport closed");
        }
    }
}
