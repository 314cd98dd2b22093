//! Core types for session-core
//!
//! Identifiers, call states and the call session record shared by the store,
//! the state table and the signaling router.

use callrelay_presence_core::Identifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session ID type
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

const SESSION_ID_PREFIX: &str = "session-";

impl SessionId {
    pub fn new() -> Self {
        Self(format!("{}{}", SESSION_ID_PREFIX, uuid::Uuid::new_v4()))
    }

    /// Whether this id has the shape of one minted by [`SessionId::new`]
    pub fn is_relay_minted(&self) -> bool {
        self.0
            .strip_prefix(SESSION_ID_PREFIX)
            .is_some_and(|rest| uuid::Uuid::parse_str(rest).is_ok())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle of a call session on the relay
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallState {
    /// Receiver has been notified, no answer yet
    Ringing,
    /// Receiver accepted; waiting for the first offer
    Accepted,
    /// Offer/answer/candidate exchange in progress
    Negotiating,
    /// Both endpoints reported a connected media path
    Active,
    /// Hung up by a participant
    Ended,
    /// Declined by the receiver
    Rejected,
    /// A participant vanished mid-session
    Failed,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Ended | CallState::Rejected | CallState::Failed)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Ringing => "ringing",
            CallState::Accepted => "accepted",
            CallState::Negotiating => "negotiating",
            CallState::Active => "active",
            CallState::Ended => "ended",
            CallState::Rejected => "rejected",
            CallState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Role of a participant in a session
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Caller,
    Receiver,
}

impl Role {
    pub fn other(self) -> Role {
        match self {
            Role::Caller => Role::Receiver,
            Role::Receiver => Role::Caller,
        }
    }
}

/// Events that drive session transitions
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallEvent {
    Accept,
    Reject,
    Offer,
    Answer,
    Candidate,
    /// A participant's media path came up
    MediaConnected,
    Hangup,
    ParticipantLost,
}

impl fmt::Display for CallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallEvent::Accept => "accept",
            CallEvent::Reject => "reject",
            CallEvent::Offer => "offer",
            CallEvent::Answer => "answer",
            CallEvent::Candidate => "candidate",
            CallEvent::MediaConnected => "connected",
            CallEvent::Hangup => "end",
            CallEvent::ParticipantLost => "fail",
        };
        f.write_str(name)
    }
}

/// Which participants have reported a connected media path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedReports {
    pub caller: bool,
    pub receiver: bool,
}

impl ConnectedReports {
    pub fn mark(&mut self, role: Role) {
        match role {
            Role::Caller => self.caller = true,
            Role::Receiver => self.receiver = true,
        }
    }

    pub fn both(&self) -> bool {
        self.caller && self.receiver
    }
}

/// A call between two identifiers, as tracked by the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSession {
    pub session_id: SessionId,
    pub caller: Identifier,
    pub receiver: Identifier,
    pub state: CallState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Participant whose offer was relayed first
    pub offerer: Option<Role>,
    /// Whether an answer has been relayed
    pub answered: bool,
    pub connected: ConnectedReports,
}

impl CallSession {
    pub fn new(caller: Identifier, receiver: Identifier) -> Self {
        let now = Utc::now();
        Self {
            session_id: SessionId::new(),
            caller,
            receiver,
            state: CallState::Ringing,
            created_at: now,
            updated_at: now,
            offerer: None,
            answered: false,
            connected: ConnectedReports::default(),
        }
    }

    /// Role `identifier` plays in this session, if any
    pub fn role_of(&self, identifier: &Identifier) -> Option<Role> {
        if *identifier == self.caller {
            Some(Role::Caller)
        } else if *identifier == self.receiver {
            Some(Role::Receiver)
        } else {
            None
        }
    }

    pub fn participant(&self, role: Role) -> &Identifier {
        match role {
            Role::Caller => &self.caller,
            Role::Receiver => &self.receiver,
        }
    }

    /// The other participant from `role`'s point of view
    pub fn counterpart(&self, role: Role) -> &Identifier {
        self.participant(role.other())
    }

    pub fn involves(&self, identifier: &Identifier) -> bool {
        self.role_of(identifier).is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Time since the session was created
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }

    pub(crate) fn set_state(&mut self, state: CallState) {
        tracing::debug!("Session {} state: {} -> {}", self.session_id, self.state, state);
        self.state = state;
        self.updated_at = Utc::now();
    }
}

/// Session statistics
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    /// Live (non-terminal) sessions
    pub live: usize,
    pub ringing: usize,
    pub accepted: usize,
    pub negotiating: usize,
    pub active: usize,
    /// Lifetime counters
    pub total_created: u64,
    pub total_ended: u64,
    pub total_rejected: u64,
    pub total_failed: u64,
}
