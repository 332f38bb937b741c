//! Synchronous foreground entry point.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::runtime::Runtime;
use tracing::{error, info_span};

use crate::llm::{Backend, Message, Role};
use crate::publish::Publisher;

/// Shown when a turn arrives before the session has published an agent.
pub const NOT_READY: &str = "Error: Agent not initialized. Please wait for MCP connection.";

/// One prior turn of the conversation, as the front-end keeps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Serves one user turn at a time on its own single-threaded runtime.
pub struct ChatService<B> {
    publisher: Arc<Publisher<B>>,
    runtime: Runtime,
}

impl<B: Backend> ChatService<B> {
    pub fn new(publisher: Arc<Publisher<B>>) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { publisher, runtime })
    }

    /// Produce the reply to `message`.
    ///
    /// Failures never escape: they come back as an `Error: ...` reply and
    /// the service stays usable for the next turn.
    pub fn chat(&self, message: &str, history: &[HistoryEntry]) -> String {
        let Some(agent) = self.publisher.get() else {
            return NOT_READY.to_string();
        };

        let _span = info_span!("turn", history = history.len()).entered();
        match self.runtime.block_on(agent.respond(to_messages(history), message)) {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, "turn failed");
                format!("Error: {e}")
            }
        }
    }
}

/// Convert front-end history into model messages, keeping only user and
/// assistant turns.
pub fn to_messages(history: &[HistoryEntry]) -> Vec<Message> {
    history
        .iter()
        .filter(|entry| matches!(entry.role, Role::User | Role::Assistant))
        .map(|entry| Message::new(entry.role, entry.content.clone()))
        .collect()
}
