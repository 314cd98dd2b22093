//! Client-side call state machine
//!
//! Mirrors the relay's session for one endpoint and drives the local
//! [`EndpointController`]. Every operation returns the messages to send to
//! the relay; the caller owns the transport.
//!
//! Ordering guarantees:
//! - an answer is only created after the remote offer has been applied
//! - remote candidates that arrive before the remote description are held
//!   back and applied right after it
//! - local media is closed the moment the call reaches [`ClientCallState::Ended`],
//!   whichever side ended it

use crate::controller::{ConnectionState, EndpointController};
use crate::error::{ClientError, Result};
use callrelay_signaling_core::{
    ClientMessage, EndReason, Identifier, NegotiationPayload, ServerMessage, SessionId,
};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientCallState {
    Idle,
    /// Call request sent, waiting for the receiver
    Dialing,
    /// Incoming call waiting for a local decision
    Ringing,
    Accepted,
    Negotiating,
    Active,
    Ended,
}

impl fmt::Display for ClientCallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientCallState::Idle => "idle",
            ClientCallState::Dialing => "dialing",
            ClientCallState::Ringing => "ringing",
            ClientCallState::Accepted => "accepted",
            ClientCallState::Negotiating => "negotiating",
            ClientCallState::Active => "active",
            ClientCallState::Ended => "ended",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDirection {
    Outgoing,
    Incoming,
}

/// Why the local call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// Hung up locally
    HungUp,
    /// Declined locally
    Declined,
    /// The receiver declined
    Rejected,
    /// The relay ended the call
    Ended(EndReason),
    /// The peer could not be reached
    Unavailable(Identifier),
    /// The relay refused the call request
    Refused(String),
    /// The media path failed
    MediaLost,
}

/// One endpoint's view of a call
pub struct ClientCall<C> {
    controller: C,
    state: ClientCallState,
    direction: Option<CallDirection>,
    peer: Option<Identifier>,
    session_id: Option<SessionId>,
    remote_description_set: bool,
    pending_candidates: Vec<NegotiationPayload>,
    connected_reported: bool,
    outcome: Option<CallOutcome>,
}

impl<C: EndpointController> ClientCall<C> {
    pub fn new(controller: C) -> Self {
        Self {
            controller,
            state: ClientCallState::Idle,
            direction: None,
            peer: None,
            session_id: None,
            remote_description_set: false,
            pending_candidates: Vec::new(),
            connected_reported: false,
            outcome: None,
        }
    }

    pub fn state(&self) -> ClientCallState {
        self.state
    }

    pub fn direction(&self) -> Option<CallDirection> {
        self.direction
    }

    pub fn peer(&self) -> Option<&Identifier> {
        self.peer.as_ref()
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn outcome(&self) -> Option<&CallOutcome> {
        self.outcome.as_ref()
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Remote candidates waiting for the remote description
    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    pub fn is_ended(&self) -> bool {
        self.state == ClientCallState::Ended
    }

    /// Ring `receiver`
    ///
    /// Local audio is attached first; if that fails nothing is sent and the
    /// call stays idle.
    pub async fn dial(&mut self, receiver: Identifier) -> Result<Vec<ClientMessage>> {
        if self.state != ClientCallState::Idle {
            return Err(ClientError::invalid_state("dial", self.state));
        }
        self.controller.attach_local_audio().await?;

        self.direction = Some(CallDirection::Outgoing);
        self.peer = Some(receiver.clone());
        self.transition(ClientCallState::Dialing);
        Ok(vec![ClientMessage::Call {
            receiver_identifier: receiver,
        }])
    }

    /// Accept the ringing call
    pub async fn accept(&mut self) -> Result<Vec<ClientMessage>> {
        if self.state != ClientCallState::Ringing {
            return Err(ClientError::invalid_state("accept", self.state));
        }
        self.controller.attach_local_audio().await?;

        self.transition(ClientCallState::Accepted);
        Ok(vec![ClientMessage::AcceptCall {
            session_id: self.session_id.clone(),
            caller_identifier: None,
        }])
    }

    /// Decline the ringing call
    pub fn reject(&mut self) -> Result<Vec<ClientMessage>> {
        if self.state != ClientCallState::Ringing {
            return Err(ClientError::invalid_state("reject", self.state));
        }
        let session_id = self.session_id.clone();
        self.finish(CallOutcome::Declined);
        Ok(vec![ClientMessage::RejectCall {
            session_id,
            caller_identifier: None,
        }])
    }

    /// Hang up; a no-op when there is no call
    pub fn hang_up(&mut self) -> Vec<ClientMessage> {
        if matches!(self.state, ClientCallState::Idle | ClientCallState::Ended) {
            return Vec::new();
        }
        let session_id = self.session_id.clone();
        self.finish(CallOutcome::HungUp);
        vec![ClientMessage::EndCall {
            session_id,
            peer_identifier: self.peer.clone(),
        }]
    }

    /// Candidate gathered by the local controller
    pub fn on_local_candidate(&mut self, candidate: NegotiationPayload) -> Vec<ClientMessage> {
        match (&self.session_id, self.state) {
            (Some(session_id), state) if !matches!(state, ClientCallState::Ended) => {
                vec![ClientMessage::IceCandidate {
                    session_id: session_id.clone(),
                    payload: candidate,
                }]
            }
            _ => {
                debug!("Discarding local candidate while {}", self.state);
                Vec::new()
            }
        }
    }

    /// Media connection state changed
    ///
    /// The first `connected` during negotiation is reported to the relay; a
    /// failed or closed media path hangs up.
    pub fn on_connection_state(&mut self, state: ConnectionState) -> Vec<ClientMessage> {
        debug!("Media connection {} while {}", state, self.state);
        match (state, self.state) {
            (ConnectionState::Connected, ClientCallState::Negotiating) if !self.connected_reported => {
                match self.session_id.clone() {
                    Some(session_id) => {
                        self.connected_reported = true;
                        vec![ClientMessage::Connected { session_id }]
                    }
                    None => Vec::new(),
                }
            }
            (lost, call) if lost.is_lost() && !matches!(call, ClientCallState::Idle | ClientCallState::Ended) => {
                let session_id = self.session_id.clone();
                self.finish(CallOutcome::MediaLost);
                vec![ClientMessage::EndCall {
                    session_id,
                    peer_identifier: self.peer.clone(),
                }]
            }
            _ => Vec::new(),
        }
    }

    /// Decode and apply one relay frame
    pub async fn handle_frame(&mut self, text: &str) -> Result<Vec<ClientMessage>> {
        let message = ServerMessage::from_json(text)?;
        self.handle(message).await
    }

    /// Apply one relay message
    pub async fn handle(&mut self, message: ServerMessage) -> Result<Vec<ClientMessage>> {
        match message {
            ServerMessage::Joined { identifier } => {
                debug!("Joined as {}", identifier);
                Ok(Vec::new())
            }
            ServerMessage::CallPlaced { session_id, .. } => {
                if self.state == ClientCallState::Dialing && self.session_id.is_none() {
                    self.session_id = Some(session_id);
                }
                Ok(Vec::new())
            }
            ServerMessage::IncomingCall {
                session_id,
                caller_identifier,
            } => {
                // Both sides dialed at once: the relay kept the peer's request,
                // and ours will come back busy
                let crossed = self.state == ClientCallState::Dialing
                    && self.session_id.is_none()
                    && self.peer.as_ref() == Some(&caller_identifier);
                if self.state != ClientCallState::Idle && !crossed {
                    warn!("Ignoring call from {} while {}", caller_identifier, self.state);
                    return Ok(Vec::new());
                }
                info!("Incoming call from {}", caller_identifier);
                self.direction = Some(CallDirection::Incoming);
                self.peer = Some(caller_identifier);
                self.session_id = Some(session_id);
                self.transition(ClientCallState::Ringing);
                Ok(Vec::new())
            }
            ServerMessage::CallAccepted { session_id } => {
                if !self.is_current(&session_id) || self.state != ClientCallState::Dialing {
                    return Ok(Vec::new());
                }
                self.transition(ClientCallState::Accepted);
                self.send_offer(session_id).await
            }
            ServerMessage::CallRejected { session_id } => {
                if self.is_current(&session_id) && !self.is_ended() {
                    self.finish(CallOutcome::Rejected);
                }
                Ok(Vec::new())
            }
            ServerMessage::Offer {
                session_id,
                payload,
            } => {
                if !self.is_current(&session_id) {
                    return Ok(Vec::new());
                }
                self.on_remote_offer(session_id, payload).await
            }
            ServerMessage::Answer {
                session_id,
                payload,
            } => {
                if !self.is_current(&session_id) {
                    return Ok(Vec::new());
                }
                if self.state != ClientCallState::Negotiating {
                    return Err(ClientError::invalid_state("apply answer", self.state));
                }
                self.apply_remote_description(&payload).await?;
                Ok(Vec::new())
            }
            ServerMessage::IceCandidate {
                session_id,
                payload,
            } => {
                if !self.is_current(&session_id) || self.is_ended() {
                    return Ok(Vec::new());
                }
                if self.remote_description_set {
                    self.controller.add_ice_candidate(&payload).await?;
                } else {
                    self.pending_candidates.push(payload);
                }
                Ok(Vec::new())
            }
            ServerMessage::CallConnected { session_id } => {
                if self.is_current(&session_id) && self.state == ClientCallState::Negotiating {
                    self.transition(ClientCallState::Active);
                }
                Ok(Vec::new())
            }
            ServerMessage::CallEnded { session_id, reason } => {
                if self.is_current(&session_id) && !self.is_ended() {
                    self.finish(CallOutcome::Ended(reason));
                }
                Ok(Vec::new())
            }
            ServerMessage::UserUnavailable { identifier } => {
                if self.peer.as_ref() == Some(&identifier)
                    && !matches!(self.state, ClientCallState::Idle | ClientCallState::Ended)
                {
                    self.finish(CallOutcome::Unavailable(identifier));
                }
                Ok(Vec::new())
            }
            ServerMessage::Error {
                kind,
                session_id,
                message,
            } => {
                warn!("Relay refused request ({}): {}", kind, message);
                // A refused call request carries no session. After a crossed
                // call was taken as incoming, the refusal of our own request
                // finds the call ringing and is ignored.
                if self.state == ClientCallState::Dialing
                    && self.session_id.is_none()
                    && session_id.is_none()
                {
                    self.finish(CallOutcome::Refused(message));
                }
                Ok(Vec::new())
            }
        }
    }

    /// Forget a finished call so the endpoint can place or take another
    pub fn reset(&mut self) -> Result<()> {
        if !matches!(self.state, ClientCallState::Ended | ClientCallState::Idle) {
            return Err(ClientError::invalid_state("reset", self.state));
        }
        self.state = ClientCallState::Idle;
        self.direction = None;
        self.peer = None;
        self.session_id = None;
        self.remote_description_set = false;
        self.pending_candidates.clear();
        self.connected_reported = false;
        self.outcome = None;
        Ok(())
    }

    async fn send_offer(&mut self, session_id: SessionId) -> Result<Vec<ClientMessage>> {
        let offer = self.controller.create_offer().await?;
        self.controller.set_local_description(&offer).await?;
        self.transition(ClientCallState::Negotiating);
        Ok(vec![ClientMessage::Offer {
            session_id,
            payload: offer,
        }])
    }

    async fn on_remote_offer(
        &mut self,
        session_id: SessionId,
        offer: NegotiationPayload,
    ) -> Result<Vec<ClientMessage>> {
        if !matches!(self.state, ClientCallState::Accepted | ClientCallState::Negotiating) {
            return Err(ClientError::invalid_state("answer an offer", self.state));
        }

        self.apply_remote_description(&offer).await?;
        let answer = self.controller.create_answer(&offer).await?;
        self.controller.set_local_description(&answer).await?;
        if self.state == ClientCallState::Accepted {
            self.transition(ClientCallState::Negotiating);
        }
        Ok(vec![ClientMessage::Answer {
            session_id,
            payload: answer,
        }])
    }

    /// Apply a remote offer or answer, then the candidates held back for it
    async fn apply_remote_description(&mut self, description: &NegotiationPayload) -> Result<()> {
        self.controller.set_remote_description(description).await?;
        self.remote_description_set = true;

        let pending = std::mem::take(&mut self.pending_candidates);
        if !pending.is_empty() {
            debug!("Applying {} held-back candidates", pending.len());
        }
        for candidate in &pending {
            self.controller.add_ice_candidate(candidate).await?;
        }
        Ok(())
    }

    fn is_current(&self, session_id: &SessionId) -> bool {
        self.session_id.as_ref() == Some(session_id)
    }

    fn transition(&mut self, next: ClientCallState) {
        debug!("Client call {} -> {}", self.state, next);
        self.state = next;
    }

    fn finish(&mut self, outcome: CallOutcome) {
        info!("Call ended: {:?}", outcome);
        self.transition(ClientCallState::Ended);
        self.pending_candidates.clear();
        self.outcome = Some(outcome);
        self.controller.close();
    }
}
