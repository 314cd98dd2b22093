//! Signaling router
//!
//! The only component that touches raw inbound messages. Each message is
//! attributed to the identifier its connection joined under, checked against
//! the session it names, applied to the session store, and the derived message
//! is forwarded to the counterpart's connection.
//!
//! Every state mutation happens under one dispatch gate, so the registry and
//! the store are always observed together in a consistent state. Delivery is a
//! non-blocking queue push, so the gate is never held across I/O.

use crate::error::{Result, SignalingError};
use crate::protocol::{ClientMessage, EndReason, NegotiationPayload, ServerMessage};
use callrelay_presence_core::{Connection, ConnectionId, PresenceRegistry};
use callrelay_session_core::{
    CallError, CallSession, ConnectedOutcome, EndOutcome, Identifier, RelayOutcome, SessionId,
    SessionStats, SessionStore, DEFAULT_RETENTION,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Connection carrying relay → client messages
pub type SignalingConnection = Connection<ServerMessage>;

/// Snapshot for the stats endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStats {
    pub online: usize,
    pub sessions: SessionStats,
}

/// Which relay a negotiation message belongs to
#[derive(Debug, Clone, Copy)]
enum Negotiation {
    Offer,
    Answer,
    Candidate,
}

pub struct SignalingRouter {
    presence: PresenceRegistry<ServerMessage>,
    sessions: SessionStore,
    /// Serializes every registry/store mutation
    gate: Mutex<()>,
}

impl SignalingRouter {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            presence: PresenceRegistry::new(),
            sessions: SessionStore::with_retention(retention),
            gate: Mutex::new(()),
        }
    }

    pub fn presence(&self) -> &PresenceRegistry<ServerMessage> {
        &self.presence
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            online: self.presence.len(),
            sessions: self.sessions.stats(),
        }
    }

    /// Decode and dispatch one text frame
    pub fn handle_frame(&self, conn: &Arc<SignalingConnection>, text: &str) -> Result<()> {
        match ClientMessage::from_json(text) {
            Ok(message) => self.handle(conn, message),
            Err(err) => {
                warn!("Malformed frame from {}: {}", conn.id(), err);
                self.report(conn, &err);
                Err(err)
            }
        }
    }

    /// Dispatch one message
    ///
    /// A rejected request is reported back to the sender before the error is
    /// returned; it never changes registry or session state.
    pub fn handle(&self, conn: &Arc<SignalingConnection>, message: ClientMessage) -> Result<()> {
        let name = message.name();
        let _gate = self.gate.lock();
        debug!("{} from {}", name, conn.id());

        let result = self.dispatch(conn, message);
        if let Err(err) = &result {
            warn!("Rejected {} from {}: {}", name, conn.id(), err);
            self.report(conn, err);
        }
        result
    }

    /// Transport lost a connection
    pub fn disconnect(&self, conn: &SignalingConnection) {
        let _gate = self.gate.lock();
        conn.close();
        if let Some(identifier) = self.presence.unregister_connection(&conn.id()) {
            info!("{} went offline ({})", identifier, conn.id());
            self.fail_session_of(&identifier, EndReason::PeerDisconnected, true);
        }
    }

    fn dispatch(&self, conn: &Arc<SignalingConnection>, message: ClientMessage) -> Result<()> {
        if let ClientMessage::Join { identifier } = message {
            return self.on_join(conn, identifier);
        }

        let sender = self
            .presence
            .identifier_of(&conn.id())
            .ok_or(CallError::NotRegistered)?;

        match message {
            ClientMessage::Join { .. } => Ok(()),
            ClientMessage::Leave => self.on_leave(conn, &sender),
            ClientMessage::Call { receiver_identifier } => {
                self.on_call(conn, &sender, &receiver_identifier)
            }
            ClientMessage::AcceptCall {
                session_id,
                caller_identifier,
            } => {
                let session_id = self.resolve_ringing(&sender, session_id, caller_identifier)?;
                self.on_accept(&sender, &session_id)
            }
            ClientMessage::RejectCall {
                session_id,
                caller_identifier,
            } => {
                let session_id = self.resolve_ringing(&sender, session_id, caller_identifier)?;
                self.on_reject(&sender, &session_id)
            }
            ClientMessage::Offer {
                session_id,
                payload,
            } => self.on_negotiation(&sender, session_id, Negotiation::Offer, payload),
            ClientMessage::Answer {
                session_id,
                payload,
            } => self.on_negotiation(&sender, session_id, Negotiation::Answer, payload),
            ClientMessage::IceCandidate {
                session_id,
                payload,
            } => self.on_negotiation(&sender, session_id, Negotiation::Candidate, payload),
            ClientMessage::Connected { session_id } => self.on_connected(conn, &sender, &session_id),
            ClientMessage::EndCall {
                session_id,
                peer_identifier,
            } => self.on_end(&sender, session_id, peer_identifier),
        }
    }

    fn on_join(&self, conn: &Arc<SignalingConnection>, identifier: Identifier) -> Result<()> {
        if identifier.is_empty() {
            return Err(SignalingError::malformed("identifier must not be empty"));
        }

        // Captured before the binding moves so it can be told what happened
        let displaced = self
            .presence
            .lookup(&identifier)
            .filter(|previous| previous.id() != conn.id());

        let registration = self.presence.register(identifier.clone(), conn);

        if registration.superseded.is_some() {
            if let Some(session) =
                self.fail_session_of(&identifier, EndReason::PeerDisconnected, true)
            {
                if let Some(previous) = displaced {
                    let _ = previous.send(ServerMessage::CallEnded {
                        session_id: session.session_id,
                        reason: EndReason::Superseded,
                    });
                }
            }
        }

        if let Some(old_identifier) = registration.previous_identifier {
            if let Some(session) =
                self.fail_session_of(&old_identifier, EndReason::PeerDisconnected, true)
            {
                let _ = conn.send(ServerMessage::CallEnded {
                    session_id: session.session_id,
                    reason: EndReason::Superseded,
                });
            }
        }

        self.reply(conn, ServerMessage::Joined { identifier });
        Ok(())
    }

    fn on_leave(&self, conn: &Arc<SignalingConnection>, sender: &Identifier) -> Result<()> {
        self.presence.unregister_connection(&conn.id());
        self.fail_session_of(sender, EndReason::PeerDisconnected, true);
        info!("{} left ({})", sender, conn.id());
        Ok(())
    }

    fn on_call(
        &self,
        conn: &Arc<SignalingConnection>,
        caller: &Identifier,
        receiver: &Identifier,
    ) -> Result<()> {
        let session = self.sessions.request_call(caller, receiver, &self.presence)?;

        self.forward_or_vanish(
            receiver,
            ServerMessage::IncomingCall {
                session_id: session.session_id.clone(),
                caller_identifier: caller.clone(),
            },
        )?;

        self.reply(
            conn,
            ServerMessage::CallPlaced {
                session_id: session.session_id,
                receiver_identifier: receiver.clone(),
            },
        );
        Ok(())
    }

    fn on_accept(&self, sender: &Identifier, session_id: &SessionId) -> Result<()> {
        let session = self.sessions.accept(session_id, sender)?;
        self.forward_or_vanish(
            &session.caller,
            ServerMessage::CallAccepted {
                session_id: session.session_id.clone(),
            },
        )
    }

    fn on_reject(&self, sender: &Identifier, session_id: &SessionId) -> Result<()> {
        let session = self.sessions.reject(session_id, sender)?;
        self.forward_or_vanish(
            &session.caller,
            ServerMessage::CallRejected {
                session_id: session.session_id.clone(),
            },
        )
    }

    fn on_negotiation(
        &self,
        sender: &Identifier,
        session_id: SessionId,
        kind: Negotiation,
        payload: NegotiationPayload,
    ) -> Result<()> {
        let outcome = match kind {
            Negotiation::Offer => self.sessions.relay_offer(&session_id, sender)?,
            Negotiation::Answer => self.sessions.relay_answer(&session_id, sender)?,
            Negotiation::Candidate => self.sessions.relay_candidate(&session_id, sender)?,
        };

        let to = match outcome {
            RelayOutcome::Forward { to, .. } => to,
            RelayOutcome::Dropped => return Ok(()),
        };

        let message = match kind {
            Negotiation::Offer => ServerMessage::Offer {
                session_id,
                payload,
            },
            Negotiation::Answer => ServerMessage::Answer {
                session_id,
                payload,
            },
            Negotiation::Candidate => ServerMessage::IceCandidate {
                session_id,
                payload,
            },
        };
        self.forward_or_vanish(&to, message)
    }

    fn on_connected(
        &self,
        conn: &Arc<SignalingConnection>,
        sender: &Identifier,
        session_id: &SessionId,
    ) -> Result<()> {
        match self.sessions.report_connected(session_id, sender)? {
            ConnectedOutcome::Activated(session) => {
                info!("Session {} is active", session.session_id);
                let connected = ServerMessage::CallConnected {
                    session_id: session.session_id.clone(),
                };
                if let Some(role) = session.role_of(sender) {
                    self.forward_or_vanish(session.counterpart(role), connected.clone())?;
                }
                self.reply(conn, connected);
                Ok(())
            }
            ConnectedOutcome::Waiting(_) | ConnectedOutcome::AlreadyActive => Ok(()),
        }
    }

    fn on_end(
        &self,
        sender: &Identifier,
        session_id: Option<SessionId>,
        peer: Option<Identifier>,
    ) -> Result<()> {
        let session_id = match session_id {
            Some(id) => id,
            // Nothing to hang up is not an error
            None => match self
                .sessions
                .session_of(sender)
                .filter(|session| peer.as_ref().map_or(true, |peer| session.involves(peer)))
            {
                Some(session) => session.session_id,
                None => return Ok(()),
            },
        };

        match self.sessions.end(&session_id, sender)? {
            EndOutcome::Ended { session, initiator } => {
                // The call is over either way; a vanished peer is not worth reporting
                let _ = self.forward_or_vanish(
                    session.counterpart(initiator),
                    ServerMessage::CallEnded {
                        session_id: session.session_id.clone(),
                        reason: EndReason::Hangup,
                    },
                );
                Ok(())
            }
            EndOutcome::AlreadyTerminated(_) => {
                debug!("Session {} already terminated", session_id);
                Ok(())
            }
        }
    }

    /// Session id for accept/reject, given explicitly or via the caller
    fn resolve_ringing(
        &self,
        sender: &Identifier,
        session_id: Option<SessionId>,
        caller: Option<Identifier>,
    ) -> Result<SessionId> {
        match (session_id, caller) {
            (Some(session_id), _) => Ok(session_id),
            (None, Some(caller)) => self
                .sessions
                .session_of(sender)
                .filter(|session| session.caller == caller)
                .map(|session| session.session_id)
                .ok_or_else(|| {
                    SignalingError::malformed(format!("no call from {} to {}", caller, sender))
                }),
            (None, None) => Err(SignalingError::malformed(
                "sessionId or callerIdentifier is required",
            )),
        }
    }

    /// Deliver to `to`, or treat `to` as vanished and report it unreachable
    fn forward_or_vanish(&self, to: &Identifier, message: ServerMessage) -> Result<()> {
        let delivered = self
            .presence
            .lookup(to)
            .map(|conn| conn.send(message).is_ok())
            .unwrap_or(false);

        if delivered {
            return Ok(());
        }

        warn!("{} vanished while being signaled", to);
        self.presence.unregister(to);
        // The requester learns through the unavailable report instead
        self.fail_session_of(to, EndReason::PeerDisconnected, false);
        Err(CallError::Unreachable(to.clone()).into())
    }

    /// Fail the live session of a participant that is gone
    ///
    /// With `notify`, the remaining participant is told the call ended.
    fn fail_session_of(
        &self,
        identifier: &Identifier,
        reason: EndReason,
        notify: bool,
    ) -> Option<CallSession> {
        let session = self.sessions.fail_participant(identifier)?;
        if notify {
            if let Some(role) = session.role_of(identifier) {
                let counterpart = session.counterpart(role);
                let message = ServerMessage::CallEnded {
                    session_id: session.session_id.clone(),
                    reason,
                };
                match self.presence.lookup(counterpart) {
                    Some(conn) => {
                        let _ = conn.send(message);
                    }
                    None => debug!("{} is gone too", counterpart),
                }
            }
        }
        Some(session)
    }

    fn reply(&self, conn: &SignalingConnection, message: ServerMessage) {
        if conn.send(message).is_err() {
            debug!("Reply to closed connection {} discarded", conn.id());
        }
    }

    /// Tell the sender its request was rejected
    fn report(&self, conn: &SignalingConnection, err: &SignalingError) {
        let message = match err {
            SignalingError::Call(CallError::Unreachable(identifier)) => {
                ServerMessage::UserUnavailable {
                    identifier: identifier.clone(),
                }
            }
            other => ServerMessage::error(other),
        };
        self.reply(conn, message);
    }

    /// Identifier a connection is registered under
    pub fn identifier_of(&self, conn_id: &ConnectionId) -> Option<Identifier> {
        self.presence.identifier_of(conn_id)
    }
}
