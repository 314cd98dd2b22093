//! Error types for the signaling layer

use callrelay_session_core::{CallError, ErrorKind};
use thiserror::Error;

/// Result type for signaling operations
pub type Result<T> = std::result::Result<T, SignalingError>;

#[derive(Debug, Error)]
pub enum SignalingError {
    /// A call/session rule rejected the request
    #[error(transparent)]
    Call(#[from] CallError),

    /// Frame could not be decoded or is missing required fields
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Invalid server configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SignalingError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Classification reported to the client
    pub fn kind(&self) -> ErrorKind {
        match self {
            SignalingError::Call(err) => err.kind(),
            _ => ErrorKind::Malformed,
        }
    }
}

impl From<serde_json::Error> for SignalingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

impl From<callrelay_infra_common::Error> for SignalingError {
    fn from(err: callrelay_infra_common::Error) -> Self {
        Self::Config(err.to_string())
    }
}
