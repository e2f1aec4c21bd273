//! Transport-level error types.

use thiserror::Error;

use spaceindex_core::error::IndexerError;

use crate::request::JsonRpcError;

/// Errors that can occur while talking to the spaces node.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, non-2xx status, ...).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC error object returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` if this error is retryable (transient).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout { .. })
    }

    /// Returns `true` if the node answered with an error object.
    pub fn is_node_error(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }

    /// Returns `true` if the node handled the call and rejected its subject,
    /// i.e. an error object carrying an application (non-reserved) code.
    pub fn is_application_error(&self) -> bool {
        matches!(self, Self::Rpc(err) if !err.is_reserved())
    }
}

impl From<TransportError> for IndexerError {
    fn from(e: TransportError) -> Self {
        IndexerError::Rpc(e.to_string())
    }
}
