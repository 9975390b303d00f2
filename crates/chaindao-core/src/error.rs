//! Error types for contract resolution, contract calls and event watching.

use thiserror::Error;

/// Errors produced by ChainDAO.
///
/// The type is `Clone` because a failed contract handle hands the same error
/// to every caller that awaits it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DaoError {
    /// The string is not a syntactically valid chain address.
    #[error("invalid address: {address:?}")]
    InvalidAddress { address: String },

    /// No deployed instance could be found for the contract.
    #[error("deployment of '{contract}' not found: {reason}")]
    DeploymentNotFound { contract: String, reason: String },

    /// Network / RPC failure reported by the transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// A contract kind does not provide the requested operation.
    #[error("'{operation}' is not implemented for contract '{contract}'")]
    NotImplemented { contract: String, operation: String },

    /// A watch failed while polling.
    #[error("subscription {id} failed: {reason}")]
    Subscription { id: u64, reason: String },

    /// Durable storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// ABI encoding or decoding failure.
    #[error("ABI error: {0}")]
    Abi(String),

    #[error("function '{name}' not found in ABI of '{contract}'")]
    UnknownFunction { contract: String, name: String },

    #[error("event '{name}' not found in ABI of '{contract}'")]
    UnknownEvent { contract: String, name: String },

    /// A wide integer did not fit the requested native type.
    #[error("value {value} does not fit in {target}")]
    NumericOverflow { value: String, target: &'static str },

    /// Invalid or unreadable configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl DaoError {
    /// Returns `true` if the error came from the transport and a later retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Subscription { .. })
    }

    /// Returns `true` if the error is the caller's fault and retrying cannot help.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress { .. }
                | Self::UnknownFunction { .. }
                | Self::UnknownEvent { .. }
                | Self::NotImplemented { .. }
        )
    }
}
