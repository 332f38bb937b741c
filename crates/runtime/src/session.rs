//! Tool-host session management.
//!
//! A [`SessionManager`] owns the one persistent connection to the remote tool
//! host. It runs on a dedicated thread with its own single-threaded runtime
//! and walks the session through connect, handshake, and discovery before
//! publishing the catalog and agent. It then holds the connection open until
//! the remote side goes away; a dropped session is never re-established.

use std::future::Future;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use mcp::{CallToolResult, SseClient, Tool};
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tracing::{Instrument, error, info, info_span, warn};

use crate::agent::Agent;
use crate::bridge::{Bridge, CALL_TIMEOUT, OnTimeout};
use crate::lifecycle::{Lifecycle, Phase};
use crate::llm::Backend;
use crate::proxy::Catalog;
use crate::publish::{Publisher, READY_TIMEOUT, ReadinessGate};
use crate::Result;

/// Operations the bridge needs from a live tool-host session.
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Fetch the full tool catalog in one round trip.
    async fn list_tools(&self) -> mcp::Result<Vec<Tool>>;

    /// Invoke one tool with an argument mapping.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> mcp::Result<CallToolResult>;

    /// Resolves once the underlying connection has gone away.
    async fn closed(&self);
}

#[async_trait]
impl ToolSession for SseClient {
    async fn list_tools(&self) -> mcp::Result<Vec<Tool>> {
        SseClient::list_tools(self).await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> mcp::Result<CallToolResult> {
        SseClient::call_tool(self, name, arguments).await
    }

    async fn closed(&self) {
        SseClient::closed(self).await
    }
}

/// Open an SSE session and complete the initialize handshake.
pub async fn connect_sse(endpoint: String) -> mcp::Result<SseClient> {
    let client = SseClient::connect(&endpoint).await?;
    let init = client.initialize().await?;
    info!(
        server = %init.server_info.name,
        version = init.server_info.version.as_deref().unwrap_or("unknown"),
        protocol = %init.protocol_version,
        "handshake complete"
    );
    Ok(client)
}

/// Starts and owns the background session context.
pub struct SessionManager<B> {
    endpoint: String,
    backend: B,
    call_timeout: Duration,
    on_timeout: OnTimeout,
    ready_timeout: Duration,
}

impl<B: Backend + 'static> SessionManager<B> {
    pub fn new(endpoint: impl Into<String>, backend: B) -> Self {
        Self {
            endpoint: endpoint.into(),
            backend,
            call_timeout: CALL_TIMEOUT,
            on_timeout: OnTimeout::default(),
            ready_timeout: READY_TIMEOUT,
        }
    }

    /// Deadline applied to every bridged tool call.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn on_timeout(mut self, on_timeout: OnTimeout) -> Self {
        self.on_timeout = on_timeout;
        self
    }

    /// Overall bound for the readiness gate.
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Launch the session thread using the SSE transport.
    pub fn start(self) -> Result<SessionHandle<B>> {
        self.spawn(connect_sse)
    }

    /// Launch the session thread with a custom connector.
    ///
    /// `connect` receives the endpoint and must return a session that has
    /// already completed its handshake.
    pub fn spawn<C, Fut, S>(self, connect: C) -> Result<SessionHandle<B>>
    where
        C: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = mcp::Result<S>>,
        S: ToolSession + 'static,
    {
        let lifecycle = Arc::new(Lifecycle::new());
        let bridge = Bridge::builder(Arc::clone(&lifecycle))
            .deadline(self.call_timeout)
            .on_timeout(self.on_timeout)
            .build();
        let publisher = Arc::new(Publisher::new(Arc::clone(&lifecycle)));

        let context = Context {
            endpoint: self.endpoint.clone(),
            backend: self.backend,
            lifecycle: Arc::clone(&lifecycle),
            bridge: bridge.clone(),
            publisher: Arc::clone(&publisher),
        };

        let thread = std::thread::Builder::new()
            .name("mcp-session".into())
            .spawn(move || context.run(connect))?;

        Ok(SessionHandle {
            endpoint: self.endpoint,
            lifecycle,
            bridge,
            publisher,
            ready_timeout: self.ready_timeout,
            thread,
        })
    }
}

/// Everything the background thread needs.
struct Context<B> {
    endpoint: String,
    backend: B,
    lifecycle: Arc<Lifecycle>,
    bridge: Bridge,
    publisher: Arc<Publisher<B>>,
}

impl<B: Backend + 'static> Context<B> {
    fn run<C, Fut, S>(self, connect: C)
    where
        C: FnOnce(String) -> Fut,
        Fut: Future<Output = mcp::Result<S>>,
        S: ToolSession + 'static,
    {
        let span = info_span!("session", endpoint = %self.endpoint);
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                span.in_scope(|| error!(error = %e, "failed to start session runtime"));
                self.lifecycle.fault(format!("failed to start session runtime: {e}"));
                return;
            }
        };

        let lifecycle = Arc::clone(&self.lifecycle);
        let reason = runtime.block_on(self.hold(connect).instrument(span));
        lifecycle.fault(reason);
    }

    /// Drive the session until it ends, returning why it ended.
    async fn hold<C, Fut, S>(self, connect: C) -> String
    where
        C: FnOnce(String) -> Fut,
        Fut: Future<Output = mcp::Result<S>>,
        S: ToolSession + 'static,
    {
        self.lifecycle.advance(Phase::Connecting);
        info!("connecting to MCP server");
        let session: Arc<dyn ToolSession> = match connect(self.endpoint.clone()).await {
            Ok(session) => Arc::new(session),
            Err(e) => {
                error!(error = %e, "failed to connect to MCP server");
                return format!("connection failed: {e}");
            }
        };
        self.bridge.attach(Handle::current(), Arc::clone(&session));

        self.lifecycle.advance(Phase::Discovering);
        let tools = match session.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                error!(error = %e, "tool discovery failed");
                return format!("tool discovery failed: {e}");
            }
        };

        let catalog = Catalog::build(tools, &self.bridge);
        info!(tools = catalog.len(), "loaded tools from MCP server");

        let agent = Agent::new(self.backend, catalog);
        if !self.publisher.publish(agent) {
            return "catalog was already published".to_string();
        }
        info!("agent created; session ready");

        session.closed().await;
        warn!("MCP session closed by the remote host; not reconnecting");
        "connection closed".to_string()
    }
}

/// Foreground view of a running session.
pub struct SessionHandle<B> {
    endpoint: String,
    lifecycle: Arc<Lifecycle>,
    bridge: Bridge,
    publisher: Arc<Publisher<B>>,
    ready_timeout: Duration,
    thread: JoinHandle<()>,
}

impl<B> SessionHandle<B> {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn publisher(&self) -> &Arc<Publisher<B>> {
        &self.publisher
    }

    /// Gate that blocks until the catalog and agent are published.
    pub fn readiness_gate(&self) -> ReadinessGate<B> {
        ReadinessGate::new(
            Arc::clone(&self.publisher),
            self.endpoint.clone(),
            self.ready_timeout,
        )
    }

    /// Whether the background thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::ReadinessError;
    use crate::testing::{MockSession, ScriptedBackend, lookup_tool, test_runtime};
    use serde_json::json;
    use std::time::Instant;

    fn manager() -> SessionManager<ScriptedBackend> {
        SessionManager::new("http://tools.test/sse", ScriptedBackend::new(vec![]))
            .ready_timeout(Duration::from_secs(5))
    }

    #[test]
    fn discovery_publishes_catalog_and_agent() {
        let session = MockSession::new(vec![lookup_tool()]).with_reply("lookup", "result for x");
        let calls = session.calls();
        let handle = manager().spawn(move |_| async move { Ok(session) }).unwrap();

        let agent = handle.readiness_gate().wait().unwrap();
        assert_eq!(handle.phase(), Phase::Ready);
        assert_eq!(agent.catalog().names(), ["lookup"]);
        assert!(agent.system_prompt().contains("1. **lookup** - Look up a term"));

        let proxy = agent.catalog().get("lookup").unwrap();
        let mut arguments = Map::new();
        arguments.insert("term".into(), json!("x"));
        let text = test_runtime("foreground-test").block_on(proxy.call(arguments));

        assert_eq!(text, "result for x");
        assert_eq!(
            calls.lock().unwrap().as_slice(),
            [("lookup".to_string(), json!({"term": "x"}))]
        );
    }

    #[test]
    fn zero_tools_still_becomes_ready() {
        let handle = manager()
            .spawn(|_| async { Ok(MockSession::new(vec![])) })
            .unwrap();

        let agent = handle.readiness_gate().wait().unwrap();
        assert!(agent.catalog().is_empty());
        assert!(agent.tool_specs().is_empty());
    }

    #[test]
    fn connect_failure_faults_and_names_endpoint() {
        let handle = manager()
            .spawn(|_| async { Err::<MockSession, _>(mcp::Error::ConnectionClosed) })
            .unwrap();

        let err = handle.readiness_gate().wait().unwrap_err();
        assert!(matches!(err, ReadinessError::Faulted { .. }));
        assert!(err.to_string().contains("http://tools.test/sse"));
        assert_eq!(handle.phase(), Phase::Faulted);
        assert!(matches!(
            handle.bridge().submit_blocking(|_| async {}),
            Err(crate::BridgeError::Faulted)
        ));
    }

    #[test]
    fn discovery_failure_faults() {
        let handle = manager()
            .spawn(|_| async { Ok(MockSession::new(vec![]).failing_discovery()) })
            .unwrap();

        let err = handle.readiness_gate().wait().unwrap_err();
        assert!(err.to_string().contains("tool discovery failed"));
    }

    #[test]
    fn hung_connect_times_out_gate() {
        let handle = manager()
            .ready_timeout(Duration::from_millis(200))
            .spawn(|_| std::future::pending::<mcp::Result<MockSession>>())
            .unwrap();

        let started = Instant::now();
        let err = handle.readiness_gate().wait().unwrap_err();
        assert!(matches!(err, ReadinessError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(handle.phase(), Phase::Connecting);
    }

    #[test]
    fn remote_close_after_ready_is_terminal() {
        let session = MockSession::new(vec![lookup_tool()]);
        let close = session.close_handle();
        let handle = manager().spawn(move |_| async move { Ok(session) }).unwrap();
        handle.readiness_gate().wait().unwrap();

        close.notify_one();
        let phase = handle
            .lifecycle()
            .wait_until(Duration::from_secs(5), |p| p == Phase::Faulted);
        assert_eq!(phase, Phase::Faulted);
        assert_eq!(handle.lifecycle().fault_reason().as_deref(), Some("connection closed"));

        let deadline = Instant::now() + Duration::from_secs(5);
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(handle.is_finished());
    }
}
