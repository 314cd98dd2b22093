//! Wire protocol between endpoints and the relay
//!
//! JSON text frames, internally tagged by `type`, camelCase fields:
//!
//! ```json
//! {"type": "join", "identifier": "alice"}
//! {"type": "call", "receiverIdentifier": "bob"}
//! {"type": "offer", "sessionId": "session-…", "payload": {"type": "offer", "sdp": "v=0…"}}
//! ```
//!
//! Negotiation payloads are carried verbatim; the relay never looks inside.

use crate::error::{Result, SignalingError};
use callrelay_session_core::{ErrorKind, Identifier, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque offer/answer/candidate blob
pub type NegotiationPayload = Value;

/// Client → relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Register under an identifier
    Join {
        #[serde(alias = "userId")]
        identifier: Identifier,
    },

    /// Drop the current registration without closing the connection
    Leave,

    /// Ring another identifier
    #[serde(rename_all = "camelCase")]
    Call {
        #[serde(alias = "receiverId")]
        receiver_identifier: Identifier,
    },

    /// Accept a ringing call, by session id or by caller
    #[serde(rename_all = "camelCase")]
    AcceptCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        #[serde(
            default,
            alias = "callerId",
            alias = "receiverId",
            skip_serializing_if = "Option::is_none"
        )]
        caller_identifier: Option<Identifier>,
    },

    /// Decline a ringing call, by session id or by caller
    #[serde(rename_all = "camelCase")]
    RejectCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        #[serde(
            default,
            alias = "callerId",
            alias = "receiverId",
            skip_serializing_if = "Option::is_none"
        )]
        caller_identifier: Option<Identifier>,
    },

    #[serde(rename_all = "camelCase")]
    Offer {
        session_id: SessionId,
        payload: NegotiationPayload,
    },

    #[serde(rename_all = "camelCase")]
    Answer {
        session_id: SessionId,
        payload: NegotiationPayload,
    },

    #[serde(rename_all = "camelCase", alias = "ice-candidate")]
    IceCandidate {
        session_id: SessionId,
        payload: NegotiationPayload,
    },

    /// The sender's media path is up
    #[serde(rename_all = "camelCase")]
    Connected { session_id: SessionId },

    /// Hang up; without a session id, hangs up the sender's current call
    ///
    /// `peer_identifier` narrows that fallback to a call with that peer.
    #[serde(rename_all = "camelCase")]
    EndCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        #[serde(default, alias = "receiverId", skip_serializing_if = "Option::is_none")]
        peer_identifier: Option<Identifier>,
    },
}

impl ClientMessage {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Message type name, for logging
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => "join",
            ClientMessage::Leave => "leave",
            ClientMessage::Call { .. } => "call",
            ClientMessage::AcceptCall { .. } => "acceptCall",
            ClientMessage::RejectCall { .. } => "rejectCall",
            ClientMessage::Offer { .. } => "offer",
            ClientMessage::Answer { .. } => "answer",
            ClientMessage::IceCandidate { .. } => "iceCandidate",
            ClientMessage::Connected { .. } => "connected",
            ClientMessage::EndCall { .. } => "endCall",
        }
    }
}

/// Why a call ended, as told to the remaining participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    /// The other participant hung up
    Hangup,
    /// The other participant's connection was lost
    PeerDisconnected,
    /// This connection's registration was taken over or renamed
    Superseded,
}

/// Relay → client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    Joined { identifier: Identifier },

    /// Call request accepted for routing; the receiver is ringing
    #[serde(rename_all = "camelCase")]
    CallPlaced {
        session_id: SessionId,
        receiver_identifier: Identifier,
    },

    #[serde(rename_all = "camelCase")]
    IncomingCall {
        session_id: SessionId,
        caller_identifier: Identifier,
    },

    #[serde(rename_all = "camelCase")]
    CallAccepted { session_id: SessionId },

    #[serde(rename_all = "camelCase")]
    CallRejected { session_id: SessionId },

    #[serde(rename_all = "camelCase")]
    Offer {
        session_id: SessionId,
        payload: NegotiationPayload,
    },

    #[serde(rename_all = "camelCase")]
    Answer {
        session_id: SessionId,
        payload: NegotiationPayload,
    },

    #[serde(rename_all = "camelCase")]
    IceCandidate {
        session_id: SessionId,
        payload: NegotiationPayload,
    },

    /// Both participants reported connected; the call is active
    #[serde(rename_all = "camelCase")]
    CallConnected { session_id: SessionId },

    #[serde(rename_all = "camelCase")]
    CallEnded {
        session_id: SessionId,
        reason: EndReason,
    },

    /// The target could not be reached
    UserUnavailable { identifier: Identifier },

    #[serde(rename_all = "camelCase")]
    Error {
        kind: ErrorKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        message: String,
    },
}

impl ServerMessage {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Error report for a rejected request
    pub fn error(err: &SignalingError) -> Self {
        let session_id = match err {
            SignalingError::Call(call_err) => call_err.session_id().cloned(),
            _ => None,
        };
        ServerMessage::Error {
            kind: err.kind(),
            session_id,
            message: err.to_string(),
        }
    }
}
