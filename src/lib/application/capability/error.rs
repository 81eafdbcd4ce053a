use super::transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("failed to connect to capability server '{owner}': {reason}")]
    Connection { owner: String, reason: String },
    #[error("capability server '{owner}' is already connected")]
    AlreadyConnected { owner: String },
    #[error("capability server '{owner}' is not connected")]
    NotConnected { owner: String },
    #[error("capability server '{owner}' transport error: {source}")]
    Transport {
        owner: String,
        #[source]
        source: TransportError,
    },
    #[error("operation '{operation}' failed on '{owner}': {detail}")]
    Invocation {
        owner: String,
        operation: String,
        detail: String,
    },
    #[error("capability server '{owner}' returned JSON-RPC error {code}: {message}")]
    Rpc {
        owner: String,
        code: i64,
        message: String,
    },
    #[error("capability server '{owner}' returned an invalid response: {reason}")]
    InvalidResponse { owner: String, reason: String },
}

impl CapabilityError {
    /// Owner-level faults after which the owner should be treated as unusable.
    pub fn is_connection_fault(&self) -> bool {
        match self {
            CapabilityError::Connection { .. } | CapabilityError::NotConnected { .. } => true,
            CapabilityError::Transport { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    pub fn owner(&self) -> &str {
        match self {
            CapabilityError::Connection { owner, .. }
            | CapabilityError::AlreadyConnected { owner }
            | CapabilityError::NotConnected { owner }
            | CapabilityError::Transport { owner, .. }
            | CapabilityError::Invocation { owner, .. }
            | CapabilityError::Rpc { owner, .. }
            | CapabilityError::InvalidResponse { owner, .. } => owner,
        }
    }
}
