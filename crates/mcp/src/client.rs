//! MCP client over the HTTP+SSE transport (connect, communicate, lifecycle).

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Url;
use reqwest::header::{ACCEPT, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, Inbound, InitializeParams, InitializeResult, JsonRpcRequest,
    JsonRpcNotification, JsonRpcResponse, ListToolsResult, METHOD_NOT_FOUND, RequestId, Tool,
};
use crate::sse::{SseStream, parse_sse_stream};

/// Default timeout for MCP requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Event announcing the URL that client messages are posted to.
const ENDPOINT_EVENT: &str = "endpoint";

/// Event carrying one JSON-RPC message from the server.
const MESSAGE_EVENT: &str = "message";

type Pending = Arc<Mutex<HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>>;

/// Handle to a live MCP session over server-sent events.
///
/// The event stream is read by a background task spawned on the runtime that
/// called [`SseClient::connect`]. Dropping the client stops that task.
pub struct SseClient {
    http: reqwest::Client,
    message_url: Url,
    pending: Pending,
    next_id: AtomicI64,
    closed: CancellationToken,
    reader: JoinHandle<()>,
    request_timeout: Duration,
}

impl SseClient {
    /// Open the event stream and wait for the server to announce its message endpoint.
    pub async fn connect(url: &str) -> Result<Self> {
        let stream_url = Url::parse(url).map_err(|e| Error::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let http = reqwest::Client::new();

        let response = http
            .get(stream_url.clone())
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .send()
            .await?;
        let response = check_status(response).await?;

        let mut events = parse_sse_stream(response.bytes_stream());
        let message_url = timeout(DEFAULT_TIMEOUT, wait_for_endpoint(&mut events, &stream_url))
            .await
            .map_err(|_| Error::Timeout {
                method: ENDPOINT_EVENT.to_string(),
            })??;
        debug!(%message_url, "message endpoint announced");

        let pending = Pending::default();
        let closed = CancellationToken::new();
        let reader = tokio::spawn(read_events(
            events,
            Arc::clone(&pending),
            http.clone(),
            message_url.clone(),
            closed.clone(),
        ));

        Ok(Self {
            http,
            message_url,
            pending,
            next_id: AtomicI64::new(1),
            closed,
            reader,
            request_timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Perform the initialize handshake (must be called before other operations).
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let result: InitializeResult = self
            .request("initialize", Some(InitializeParams::default()))
            .await?;
        self.notify("notifications/initialized").await?;
        Ok(result)
    }

    /// Fetch the full tool catalog.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let result: ListToolsResult = self.request("tools/list", None::<()>).await?;
        Ok(result.tools)
    }

    /// Call a tool by name.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };

        let result: CallToolResult = self.request("tools/call", Some(params)).await?;

        if result.is_error {
            let error_text = result.texts().collect::<Vec<_>>().join("\n");
            return Err(Error::ToolCallFailed(error_text));
        }

        Ok(result)
    }

    /// Whether the event stream has ended.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the event stream has ended.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    // --- Internal methods ---

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p);
        }

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id.clone(), tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        debug!(method, "sending request");
        post(&self.http, &self.message_url, &request).await?;

        let response = await_response(rx, &self.closed, self.request_timeout, method).await?;

        let result_value = response.into_result()?;
        Ok(serde_json::from_value(result_value)?)
    }

    async fn notify(&self, method: &str) -> Result<()> {
        post(&self.http, &self.message_url, &JsonRpcNotification::new(method)).await
    }
}

impl Drop for SseClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Removes a pending entry when its request finishes, times out, or is dropped.
struct PendingGuard<'a> {
    pending: &'a Pending,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

fn lock(
    pending: &Pending,
) -> MutexGuard<'_, HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Resolve the announced endpoint against the stream URL.
fn resolve_endpoint(stream_url: &Url, data: &str) -> Result<Url> {
    stream_url.join(data.trim()).map_err(|e| Error::InvalidUrl {
        url: data.to_string(),
        reason: e.to_string(),
    })
}

async fn wait_for_endpoint(events: &mut SseStream, stream_url: &Url) -> Result<Url> {
    while let Some(event) = events.next().await {
        let event = event?;
        if event.event_type == ENDPOINT_EVENT {
            return resolve_endpoint(stream_url, &event.data);
        }
        debug!(event = %event.event_type, "ignoring event before endpoint");
    }
    Err(Error::MissingEndpoint)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Status { status, body })
}

async fn post(http: &reqwest::Client, url: &Url, body: &impl Serialize) -> Result<()> {
    let response = http.post(url.clone()).json(body).send().await?;
    check_status(response).await?;
    Ok(())
}

/// Hand a response to the request waiting for it.
///
/// Returns `false` when no request with that id is outstanding.
fn deliver(pending: &Pending, response: JsonRpcResponse) -> bool {
    let Some(sender) = lock(pending).remove(&response.id) else {
        return false;
    };
    sender.send(response).is_ok()
}

/// Wait for the reply to one request.
///
/// Fails with [`Error::ConnectionClosed`] as soon as the stream ends, even if
/// the entry was inserted after the reader cleared the pending map.
async fn await_response(
    rx: oneshot::Receiver<JsonRpcResponse>,
    closed: &CancellationToken,
    wait: Duration,
    method: &str,
) -> Result<JsonRpcResponse> {
    tokio::select! {
        biased;
        response = timeout(wait, rx) => response
            .map_err(|_| Error::Timeout {
                method: method.to_string(),
            })?
            .map_err(|_| Error::ConnectionClosed),
        _ = closed.cancelled() => Err(Error::ConnectionClosed),
    }
}

/// Reply owed to a server-initiated request.
fn reply_to(id: RequestId, method: &str) -> JsonRpcResponse {
    match method {
        "ping" => JsonRpcResponse::success(id, Value::Object(Map::new())),
        _ => JsonRpcResponse::failure(id, METHOD_NOT_FOUND, format!("method not found: {method}")),
    }
}

async fn read_events(
    mut events: SseStream,
    pending: Pending,
    http: reqwest::Client,
    message_url: Url,
    closed: CancellationToken,
) {
    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "event stream failed");
                break;
            }
        };
        if event.event_type != MESSAGE_EVENT {
            debug!(event = %event.event_type, "ignoring event");
            continue;
        }

        match Inbound::parse(&event.data) {
            Ok(Inbound::Response(response)) => {
                let id = response.id.clone();
                if !deliver(&pending, response) {
                    debug!(?id, "dropping response with no waiting request");
                }
            }
            Ok(Inbound::Request { id, method }) => {
                debug!(%method, "answering server request");
                if let Err(e) = post(&http, &message_url, &reply_to(id, &method)).await {
                    warn!(error = %e, %method, "failed to answer server request");
                }
            }
            Ok(Inbound::Notification { method }) => {
                debug!(%method, "server notification");
            }
            Err(e) => {
                warn!(error = %e, "malformed message from server");
            }
        }
    }

    // Dropping the senders fails every outstanding request.
    lock(&pending).clear();
    closed.cancel();
}
