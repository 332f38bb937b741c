//! Test doubles shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mcp::{CallToolResult, Tool, ToolContent};
use serde_json::{Map, Value, json};
use tokio::runtime::Runtime;
use tokio::sync::Notify;

use crate::bridge::Bridge;
use crate::lifecycle::{Lifecycle, Phase};
use crate::llm::{Backend, Message, ModelError, ModelRequest, ModelResponse, Usage};
use crate::session::ToolSession;

pub type CallLog = Arc<Mutex<Vec<(String, Value)>>>;

#[derive(Debug, Clone)]
enum Reply {
    Result(CallToolResult),
    Failure(String),
    Hang,
}

/// In-memory tool host.
#[derive(Debug, Default)]
pub struct MockSession {
    tools: Vec<Tool>,
    replies: HashMap<String, Reply>,
    discovery_fails: bool,
    calls: CallLog,
    close: Arc<Notify>,
}

impl MockSession {
    pub fn new(tools: Vec<Tool>) -> Self {
        Self {
            tools,
            ..Self::default()
        }
    }

    pub fn with_reply(self, tool: &str, text: &str) -> Self {
        self.with_result(tool, CallToolResult {
            content: vec![ToolContent::text(text)],
            is_error: false,
        })
    }

    pub fn with_result(mut self, tool: &str, result: CallToolResult) -> Self {
        self.replies.insert(tool.into(), Reply::Result(result));
        self
    }

    pub fn with_failure(mut self, tool: &str, message: &str) -> Self {
        self.replies.insert(tool.into(), Reply::Failure(message.into()));
        self
    }

    pub fn hanging(mut self, tool: &str) -> Self {
        self.replies.insert(tool.into(), Reply::Hang);
        self
    }

    pub fn failing_discovery(mut self) -> Self {
        self.discovery_fails = true;
        self
    }

    pub fn calls(&self) -> CallLog {
        Arc::clone(&self.calls)
    }

    /// Notifying this handle ends the session.
    pub fn close_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.close)
    }
}

#[async_trait]
impl ToolSession for MockSession {
    async fn list_tools(&self) -> mcp::Result<Vec<Tool>> {
        if self.discovery_fails {
            return Err(mcp::Error::Timeout {
                method: "tools/list".into(),
            });
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> mcp::Result<CallToolResult> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), Value::Object(arguments)));
        match self.replies.get(name).cloned() {
            Some(Reply::Result(result)) => Ok(result),
            Some(Reply::Failure(message)) => Err(mcp::Error::ToolCallFailed(message)),
            Some(Reply::Hang) => std::future::pending().await,
            None => Ok(CallToolResult::default()),
        }
    }

    async fn closed(&self) {
        self.close.notified().await;
    }
}

/// Backend that replays canned assistant messages and records every request.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Message>>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Message>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Arc<Mutex<Vec<Vec<Message>>>> {
        Arc::clone(&self.requests)
    }
}

impl Backend for ScriptedBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        self.requests.lock().unwrap().push(request.messages.to_vec());
        let message = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::Api("script exhausted".into()))?;
        Ok(ModelResponse {
            message,
            usage: Usage::default(),
        })
    }
}

/// A tool advertising one required string parameter.
pub fn lookup_tool() -> Tool {
    Tool {
        name: "lookup".into(),
        description: Some("Look up a term\n\nReturns its definition.".into()),
        input_schema: json!({
            "type": "object",
            "properties": {
                "term": {"type": "string", "description": "Term to look up"}
            },
            "required": ["term"]
        }),
    }
}

/// Runtime whose worker thread carries `name`.
pub fn test_runtime(name: &str) -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name(name)
        .enable_all()
        .build()
        .unwrap()
}

/// A bridge attached to `session` on a `session-test` runtime and marked ready.
pub fn ready_bridge(
    session: impl ToolSession + 'static,
    deadline: Duration,
) -> (Runtime, Bridge, Arc<Lifecycle>) {
    let runtime = test_runtime("session-test");
    let lifecycle = Arc::new(Lifecycle::new());
    let bridge = Bridge::builder(Arc::clone(&lifecycle))
        .deadline(deadline)
        .build();
    assert!(bridge.attach(runtime.handle().clone(), Arc::new(session)));
    assert!(lifecycle.advance(Phase::Ready));
    (runtime, bridge, lifecycle)
}
