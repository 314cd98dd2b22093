//! Session storage and transitions
//!
//! All state lives behind one lock so that the reachability/busy checks and
//! the insert in [`SessionStore::request_call`] are a single atomic step. Two
//! crossing call requests between the same pair therefore collapse into one
//! session: whichever is processed second finds its target busy.

use crate::errors::{CallError, Result};
use crate::ledger::{TerminatedLedger, DEFAULT_RETENTION};
use crate::state_table::MASTER_TABLE;
use crate::types::{CallEvent, CallSession, CallState, Role, SessionId, SessionStats};
use callrelay_presence_core::{Identifier, PresenceRegistry};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

/// Answers "is this identifier reachable right now"
pub trait Reachability {
    fn is_reachable(&self, identifier: &Identifier) -> bool;
}

impl<M> Reachability for PresenceRegistry<M> {
    fn is_reachable(&self, identifier: &Identifier) -> bool {
        self.is_online(identifier)
    }
}

/// Result of relaying an offer, answer or candidate
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    /// Deliver the payload to `to`
    Forward { session: CallSession, to: Identifier },
    /// Session already terminated; the payload is discarded
    Dropped,
}

/// Result of a participant reporting its media path connected
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectedOutcome {
    /// Still waiting for the other participant
    Waiting(CallSession),
    /// Both sides reported; the session just became active
    Activated(CallSession),
    /// Session was already active
    AlreadyActive,
}

/// Result of a hangup
#[derive(Debug, Clone, PartialEq)]
pub enum EndOutcome {
    /// The session was live and is now ended
    Ended { session: CallSession, initiator: Role },
    /// The session had already reached a terminal state
    ///
    /// `None` when the session has aged out of the terminated ledger.
    AlreadyTerminated(Option<CallSession>),
}

#[derive(Debug, Default)]
struct Counters {
    created: u64,
    ended: u64,
    rejected: u64,
    failed: u64,
}

#[derive(Debug)]
struct StoreInner {
    /// Primary storage - all live sessions
    sessions: HashMap<SessionId, CallSession>,
    /// Index by participant identifier
    by_participant: HashMap<Identifier, SessionId>,
    terminated: TerminatedLedger,
    counters: Counters,
}

impl StoreInner {
    /// Find a live or recently terminated session and the sender's role in it
    fn locate(
        &self,
        session_id: &SessionId,
        by: &Identifier,
        event: CallEvent,
    ) -> Result<(Role, &CallSession)> {
        let session = self
            .sessions
            .get(session_id)
            .or_else(|| self.terminated.get(session_id))
            .ok_or_else(|| CallError::SessionNotFound(session_id.clone()))?;
        let role = session
            .role_of(by)
            .ok_or_else(|| CallError::forbidden(session_id, by, event))?;
        Ok((role, session))
    }

    /// Whether `session_id` was minted here but is neither live nor remembered
    ///
    /// Ids are never reused, so such a session can only have terminated and
    /// aged out of the ledger.
    fn is_forgotten(&self, session_id: &SessionId) -> bool {
        session_id.is_relay_minted()
            && !self.sessions.contains_key(session_id)
            && self.terminated.get(session_id).is_none()
    }

    /// Look up the next state for a live session, rejecting terminal ones
    fn next_state(&self, session: &CallSession, event: CallEvent) -> Result<CallState> {
        MASTER_TABLE
            .next_state(session.state, event)
            .ok_or_else(|| CallError::invalid_transition(&session.session_id, session.state, event))
    }

    fn live_mut(&mut self, session_id: &SessionId) -> Result<&mut CallSession> {
        self.sessions
            .get_mut(session_id)
            .ok_or_else(|| CallError::SessionNotFound(session_id.clone()))
    }

    /// Move a live session into a terminal state and out of the store
    fn finish(&mut self, session_id: &SessionId, state: CallState) -> Option<CallSession> {
        let mut session = self.sessions.remove(session_id)?;
        for participant in [&session.caller, &session.receiver] {
            if self.by_participant.get(participant) == Some(session_id) {
                self.by_participant.remove(participant);
            }
        }
        session.set_state(state);
        match state {
            CallState::Ended => self.counters.ended += 1,
            CallState::Rejected => self.counters.rejected += 1,
            CallState::Failed => self.counters.failed += 1,
            _ => {}
        }
        self.terminated.record(session.clone());
        info!("Session {} {} ({} -> {})", session_id, state, session.caller, session.receiver);
        Some(session)
    }
}

/// In-memory store of call sessions
pub struct SessionStore {
    inner: RwLock<StoreInner>,
}

impl SessionStore {
    /// Create a new session store
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Create a store remembering up to `retention` terminated sessions
    pub fn with_retention(retention: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                sessions: HashMap::new(),
                by_participant: HashMap::new(),
                terminated: TerminatedLedger::new(retention),
                counters: Counters::default(),
            }),
        }
    }

    /// Open a ringing session from `caller` to `receiver`
    pub fn request_call(
        &self,
        caller: &Identifier,
        receiver: &Identifier,
        presence: &dyn Reachability,
    ) -> Result<CallSession> {
        if caller == receiver {
            return Err(CallError::SelfCall(caller.clone()));
        }
        if !presence.is_reachable(receiver) {
            return Err(CallError::Unreachable(receiver.clone()));
        }

        let mut inner = self.inner.write();
        if inner.by_participant.contains_key(receiver) {
            return Err(CallError::Busy(receiver.clone()));
        }
        if inner.by_participant.contains_key(caller) {
            return Err(CallError::AlreadyInCall(caller.clone()));
        }

        let session = CallSession::new(caller.clone(), receiver.clone());
        let session_id = session.session_id.clone();
        inner.by_participant.insert(caller.clone(), session_id.clone());
        inner.by_participant.insert(receiver.clone(), session_id.clone());
        inner.sessions.insert(session_id.clone(), session.clone());
        inner.counters.created += 1;

        info!("Created session {} ({} -> {})", session_id, caller, receiver);
        Ok(session)
    }

    /// Receiver accepts a ringing call
    pub fn accept(&self, session_id: &SessionId, by: &Identifier) -> Result<CallSession> {
        let mut inner = self.inner.write();
        let (role, session) = inner.locate(session_id, by, CallEvent::Accept)?;
        if role != Role::Receiver {
            return Err(CallError::forbidden(session_id, by, CallEvent::Accept));
        }
        let next = inner.next_state(session, CallEvent::Accept)?;

        let session = inner.live_mut(session_id)?;
        session.set_state(next);
        Ok(session.clone())
    }

    /// Receiver declines a ringing call; the session is removed
    pub fn reject(&self, session_id: &SessionId, by: &Identifier) -> Result<CallSession> {
        let mut inner = self.inner.write();
        let (role, session) = inner.locate(session_id, by, CallEvent::Reject)?;
        if role != Role::Receiver {
            return Err(CallError::forbidden(session_id, by, CallEvent::Reject));
        }
        let next = inner.next_state(session, CallEvent::Reject)?;

        inner
            .finish(session_id, next)
            .ok_or_else(|| CallError::SessionNotFound(session_id.clone()))
    }

    /// Relay an offer; the first one moves the session into negotiation
    ///
    /// A later offer (renegotiation) replaces the pending one and must be
    /// answered by the other side again.
    pub fn relay_offer(&self, session_id: &SessionId, from: &Identifier) -> Result<RelayOutcome> {
        let mut inner = self.inner.write();
        let (role, session) = inner.locate(session_id, from, CallEvent::Offer)?;
        let next = inner.next_state(session, CallEvent::Offer)?;

        let session = inner.live_mut(session_id)?;
        if session.state != next {
            session.set_state(next);
        }
        session.offerer = Some(role);
        session.answered = false;
        debug!("Offer for {} from {:?}", session_id, role);

        Ok(RelayOutcome::Forward {
            to: session.counterpart(role).clone(),
            session: session.clone(),
        })
    }

    /// Relay an answer to the pending offer
    pub fn relay_answer(&self, session_id: &SessionId, from: &Identifier) -> Result<RelayOutcome> {
        let mut inner = self.inner.write();
        let (role, session) = inner.locate(session_id, from, CallEvent::Answer)?;
        inner.next_state(session, CallEvent::Answer)?;
        if session.offerer != Some(role.other()) {
            // No offer yet, or answering one's own offer
            return Err(CallError::invalid_transition(
                session_id,
                session.state,
                CallEvent::Answer,
            ));
        }

        let session = inner.live_mut(session_id)?;
        session.answered = true;
        Ok(RelayOutcome::Forward {
            to: session.counterpart(role).clone(),
            session: session.clone(),
        })
    }

    /// Relay a network candidate; dropped once the session is terminal
    pub fn relay_candidate(
        &self,
        session_id: &SessionId,
        from: &Identifier,
    ) -> Result<RelayOutcome> {
        let inner = self.inner.read();
        if inner.is_forgotten(session_id) {
            debug!("Dropping candidate for forgotten session {}", session_id);
            return Ok(RelayOutcome::Dropped);
        }
        let (role, session) = inner.locate(session_id, from, CallEvent::Candidate)?;
        if session.is_terminal() {
            debug!("Dropping candidate for terminated session {}", session_id);
            return Ok(RelayOutcome::Dropped);
        }
        inner.next_state(session, CallEvent::Candidate)?;

        Ok(RelayOutcome::Forward {
            to: session.counterpart(role).clone(),
            session: session.clone(),
        })
    }

    /// Record that `from`'s media path is up; active once both sides report
    pub fn report_connected(
        &self,
        session_id: &SessionId,
        from: &Identifier,
    ) -> Result<ConnectedOutcome> {
        let mut inner = self.inner.write();
        let (role, session) = inner.locate(session_id, from, CallEvent::MediaConnected)?;
        let next = inner.next_state(session, CallEvent::MediaConnected)?;
        if session.state == CallState::Active {
            return Ok(ConnectedOutcome::AlreadyActive);
        }
        if !session.answered {
            // Connectivity cannot exist before the offer/answer round trip
            return Err(CallError::invalid_transition(
                session_id,
                session.state,
                CallEvent::MediaConnected,
            ));
        }

        let session = inner.live_mut(session_id)?;
        session.connected.mark(role);
        if session.connected.both() {
            session.set_state(next);
            Ok(ConnectedOutcome::Activated(session.clone()))
        } else {
            Ok(ConnectedOutcome::Waiting(session.clone()))
        }
    }

    /// Hang up; repeated calls on a terminated session are no-ops
    pub fn end(&self, session_id: &SessionId, by: &Identifier) -> Result<EndOutcome> {
        let mut inner = self.inner.write();
        if inner.is_forgotten(session_id) {
            return Ok(EndOutcome::AlreadyTerminated(None));
        }
        let (role, session) = inner.locate(session_id, by, CallEvent::Hangup)?;
        if session.is_terminal() {
            return Ok(EndOutcome::AlreadyTerminated(Some(session.clone())));
        }
        let next = inner.next_state(session, CallEvent::Hangup)?;

        let session = inner
            .finish(session_id, next)
            .ok_or_else(|| CallError::SessionNotFound(session_id.clone()))?;
        Ok(EndOutcome::Ended {
            session,
            initiator: role,
        })
    }

    /// Fail the live session `identifier` participates in, if any
    pub fn fail_participant(&self, identifier: &Identifier) -> Option<CallSession> {
        let mut inner = self.inner.write();
        let session_id = inner.by_participant.get(identifier)?.clone();
        let next = {
            let session = inner.sessions.get(&session_id)?;
            MASTER_TABLE.next_state(session.state, CallEvent::ParticipantLost)?
        };
        inner.finish(&session_id, next)
    }

    /// Get a live or recently terminated session
    pub fn get(&self, session_id: &SessionId) -> Option<CallSession> {
        let inner = self.inner.read();
        inner
            .sessions
            .get(session_id)
            .or_else(|| inner.terminated.get(session_id))
            .cloned()
    }

    /// The live session `identifier` participates in
    pub fn session_of(&self, identifier: &Identifier) -> Option<CallSession> {
        let inner = self.inner.read();
        let session_id = inner.by_participant.get(identifier)?;
        inner.sessions.get(session_id).cloned()
    }

    /// Whether `identifier` is in a live session
    pub fn is_engaged(&self, identifier: &Identifier) -> bool {
        self.inner.read().by_participant.contains_key(identifier)
    }

    /// Get all live sessions
    pub fn list_sessions(&self) -> Vec<CallSession> {
        self.inner.read().sessions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get session statistics
    pub fn stats(&self) -> SessionStats {
        let inner = self.inner.read();
        let mut stats = SessionStats {
            live: inner.sessions.len(),
            total_created: inner.counters.created,
            total_ended: inner.counters.ended,
            total_rejected: inner.counters.rejected,
            total_failed: inner.counters.failed,
            ..Default::default()
        };

        for session in inner.sessions.values() {
            match session.state {
                CallState::Ringing => stats.ringing += 1,
                CallState::Accepted => stats.accepted += 1,
                CallState::Negotiating => stats.negotiating += 1,
                CallState::Active => stats.active += 1,
                _ => {}
            }
        }

        stats
    }
}
