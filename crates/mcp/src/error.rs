//! MCP error types.

use crate::protocol::JsonRpcError;
use thiserror::Error;

/// Errors from the MCP client.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("event stream error: {0}")]
    Stream(String),

    #[error("server did not announce a message endpoint")]
    MissingEndpoint,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("timeout waiting for response to {method}")]
    Timeout { method: String },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),

    #[error("tool call failed: {0}")]
    ToolCallFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
