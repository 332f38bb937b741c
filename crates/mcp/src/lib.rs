//! MCP (Model Context Protocol) client library.
//!
//! This crate provides a client for communicating with MCP servers over the
//! HTTP+SSE transport: a long-lived `GET` event stream carries server
//! messages, and client messages are posted to the endpoint the server
//! announces on that stream.
//!
//! # Example
//!
//! ```no_run
//! use mcp::SseClient;
//!
//! # async fn example() -> mcp::Result<()> {
//! let client = SseClient::connect("http://localhost:8000/sse").await?;
//! client.initialize().await?;
//!
//! for tool in client.list_tools().await? {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let mut arguments = serde_json::Map::new();
//! arguments.insert("query".into(), "rust".into());
//! let result = client.call_tool("search_books", arguments).await?;
//! for text in result.texts() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod protocol;
mod sse;

pub use client::{DEFAULT_TIMEOUT, SseClient};
pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION, RequestId,
    ResourceContents, ServerCapabilities, ServerInfo, Tool, ToolContent,
};
pub use sse::{SseEvent, parse_sse_stream};
