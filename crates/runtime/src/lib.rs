//! Bridgechat runtime: a synchronous chat front door onto an asynchronous
//! MCP tool session.
//!
//! # Overview
//!
//! - **SessionManager**: owns the single MCP session on a dedicated thread,
//!   runs the handshake and tool discovery, then publishes the agent.
//! - **Bridge**: schedules work onto the session's runtime from any thread
//!   and waits for it with a fixed deadline.
//! - **Catalog / ToolProxy**: one proxy per discovered tool, built from the
//!   tool's input schema.
//! - **ReadinessGate**: blocks startup until the agent is published.
//! - **ChatService**: the synchronous `chat(message, history)` entry point.
//!
//! # Example
//!
//! ```no_run
//! use runtime::{ChatService, OpenAiBackend, SessionManager};
//!
//! # fn example() -> runtime::Result<()> {
//! let backend = OpenAiBackend::builder("sk-or-...", "https://openrouter.ai/api/v1").build();
//! let session = SessionManager::new("http://localhost:8000/sse", backend).start()?;
//! let agent = session.readiness_gate().wait()?;
//! println!("{} tools available", agent.catalog().len());
//!
//! let chat = ChatService::new(session.publisher().clone())?;
//! println!("{}", chat.chat("What can you do?", &[]));
//! # Ok(())
//! # }
//! ```

mod agent;
mod bridge;
mod chat;
mod error;
mod lifecycle;
pub mod llm;
mod providers;
mod proxy;
mod publish;
pub mod schema;
mod session;

#[cfg(test)]
mod testing;

pub use agent::{Agent, AgentError, MAX_STEPS, system_prompt};
pub use bridge::{Bridge, BridgeBuilder, BridgeError, CALL_TIMEOUT, OnTimeout};
pub use chat::{ChatService, HistoryEntry, NOT_READY, to_messages};
pub use error::{Error, Result};
pub use lifecycle::{Lifecycle, Phase};
pub use llm::{Backend, Message, ModelError, Role};
pub use providers::{DEFAULT_MODEL, DEFAULT_TEMPERATURE, OpenAiBackend, OpenAiBackendBuilder};
pub use proxy::{Catalog, NO_RESULT, NO_TEXT_RESULT, ToolDescriptor, ToolProxy, result_text};
pub use publish::{Publisher, READY_TIMEOUT, ReadinessError, ReadinessGate};
pub use schema::{ParamKind, ParameterSpec};
pub use session::{SessionHandle, SessionManager, ToolSession, connect_sse};

pub use mcp::{CallToolResult, Tool};
