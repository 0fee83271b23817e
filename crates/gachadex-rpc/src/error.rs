//! Transport-level error types.

use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors from the RPC transports (HTTP and WebSocket).
#[derive(Debug, Error)]
pub enum RpcError {
    /// HTTP request failed (connection refused, timeout, non-2xx).
    #[error("HTTP error: {0}")]
    Http(String),

    /// WebSocket connect/send/receive failure.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON-RPC error envelope returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// The reconnect loop gave up after the configured attempt cap.
    /// This is fatal and requires operator intervention.
    #[error("reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },

    /// A response was structurally not what the method contract promises.
    #[error("malformed RPC response: {0}")]
    MalformedResponse(String),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

impl RpcError {
    /// Transient errors worth retrying at the HTTP layer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::WebSocket(_))
    }
}
