//! Transport-level error types.

use chaindao_core::DaoError;
use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors raised while talking to a JSON-RPC node.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Connection refused, reset, non-2xx status, and the like.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The node answered with a JSON-RPC error object.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The node answered, but not with what the method promises.
    #[error("malformed {method} response: {reason}")]
    Decode { method: String, reason: String },
}

impl RpcError {
    /// Returns `true` if this error is transient and the request may be resent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout { .. })
    }

    pub(crate) fn decode(method: &str, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            method: method.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<RpcError> for DaoError {
    fn from(e: RpcError) -> Self {
        DaoError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_failures_are_retryable() {
        assert!(RpcError::Http("connection refused".into()).is_retryable());
        assert!(RpcError::Timeout { ms: 30_000 }.is_retryable());
        let reverted = RpcError::Rpc(JsonRpcError {
            code: 3,
            message: "execution reverted".into(),
            data: None,
        });
        assert!(!reverted.is_retryable());
        assert!(!RpcError::decode("eth_blockNumber", "not a string").is_retryable());
    }

    #[test]
    fn converts_to_transport_error() {
        let err: DaoError = RpcError::Timeout { ms: 10 }.into();
        assert_eq!(err, DaoError::Transport("request timed out after 10ms".into()));
        assert!(err.is_retryable());
    }
}
