//! Error taxonomy for call signaling
//!
//! Every variant is recoverable: it rejects the offending request only and
//! leaves registry and session state untouched.

use crate::types::{CallEvent, CallState, SessionId};
use callrelay_presence_core::Identifier;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, CallError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Target identifier is not present in the registry, or vanished
    #[error("User {0} is unavailable")]
    Unreachable(Identifier),

    /// Target is already in a non-terminal session
    #[error("User {0} is busy")]
    Busy(Identifier),

    /// Requester is already in a non-terminal session
    #[error("{0} is already in a call")]
    AlreadyInCall(Identifier),

    /// The session is not in a state that permits the request
    #[error("Cannot {event} session {session_id} while {state}")]
    InvalidTransition {
        session_id: SessionId,
        state: CallState,
        event: CallEvent,
    },

    /// A caller tried to ring its own identifier
    #[error("{0} cannot call itself")]
    SelfCall(Identifier),

    /// Sender is not a participant of the session, or plays the wrong role
    #[error("{identifier} may not {event} session {session_id}")]
    Forbidden {
        session_id: SessionId,
        identifier: Identifier,
        event: CallEvent,
    },

    /// Sender has not joined under any identifier
    #[error("Connection has not joined")]
    NotRegistered,

    /// No live or recently terminated session has this id
    #[error("Session {0} not found")]
    SessionNotFound(SessionId),
}

impl CallError {
    pub fn invalid_transition(session_id: &SessionId, state: CallState, event: CallEvent) -> Self {
        Self::InvalidTransition {
            session_id: session_id.clone(),
            state,
            event,
        }
    }

    pub fn forbidden(session_id: &SessionId, identifier: &Identifier, event: CallEvent) -> Self {
        Self::Forbidden {
            session_id: session_id.clone(),
            identifier: identifier.clone(),
            event,
        }
    }

    /// Wire-level classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CallError::Unreachable(_) => ErrorKind::Unreachable,
            CallError::Busy(_) => ErrorKind::Busy,
            CallError::AlreadyInCall(_) => ErrorKind::AlreadyInCall,
            CallError::InvalidTransition { .. } | CallError::SelfCall(_) => {
                ErrorKind::InvalidTransition
            }
            CallError::Forbidden { .. } => ErrorKind::Forbidden,
            CallError::NotRegistered => ErrorKind::NotRegistered,
            CallError::SessionNotFound(_) => ErrorKind::SessionNotFound,
        }
    }

    /// Session the error refers to, when there is one
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            CallError::InvalidTransition { session_id, .. }
            | CallError::Forbidden { session_id, .. }
            | CallError::SessionNotFound(session_id) => Some(session_id),
            _ => None,
        }
    }
}

/// Error classes reported to clients
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Unreachable,
    Busy,
    AlreadyInCall,
    InvalidTransition,
    Forbidden,
    NotRegistered,
    SessionNotFound,
    /// Frame could not be parsed
    Malformed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Unreachable => "unreachable",
            ErrorKind::Busy => "busy",
            ErrorKind::AlreadyInCall => "alreadyInCall",
            ErrorKind::InvalidTransition => "invalidTransition",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotRegistered => "notRegistered",
            ErrorKind::SessionNotFound => "sessionNotFound",
            ErrorKind::Malformed => "malformed",
        };
        f.write_str(name)
    }
}
