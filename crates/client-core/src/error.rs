//! Client-side error types

use crate::call::ClientCallState;
use callrelay_signaling_core::SignalingError;
use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised on the endpoint; none of these are sent to the relay
#[derive(Debug, Error)]
pub enum ClientError {
    /// No local audio source could be attached
    #[error("Media unavailable: {0}")]
    MediaUnavailable(String),

    /// The endpoint controller failed to produce or apply a description
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// The action does not apply to the call's current state
    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: ClientCallState,
    },

    /// A relay frame could not be decoded
    #[error(transparent)]
    Protocol(#[from] SignalingError),
}

impl ClientError {
    pub fn invalid_state(action: &'static str, state: ClientCallState) -> Self {
        Self::InvalidState { action, state }
    }

    pub fn is_media_unavailable(&self) -> bool {
        matches!(self, ClientError::MediaUnavailable(_))
    }
}
