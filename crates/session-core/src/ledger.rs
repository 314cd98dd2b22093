//! Bounded memory of recently terminated sessions
//!
//! Terminal sessions leave the live store immediately, but late messages for
//! them (a second hangup, trailing ICE candidates) still need to be told apart
//! from messages for sessions that never existed.

use crate::types::{CallSession, SessionId};
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_RETENTION: usize = 1024;

#[derive(Debug)]
pub(crate) struct TerminatedLedger {
    order: VecDeque<SessionId>,
    sessions: HashMap<SessionId, CallSession>,
    capacity: usize,
}

impl TerminatedLedger {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity.min(DEFAULT_RETENTION)),
            sessions: HashMap::new(),
            capacity,
        }
    }

    /// Remember a terminated session, evicting the oldest when full
    pub(crate) fn record(&mut self, session: CallSession) {
        if self.capacity == 0 {
            return;
        }
        if self.sessions.contains_key(&session.session_id) {
            return;
        }
        while self.order.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.sessions.remove(&evicted);
            }
        }
        self.order.push_back(session.session_id.clone());
        self.sessions.insert(session.session_id.clone(), session);
    }

    pub(crate) fn get(&self, session_id: &SessionId) -> Option<&CallSession> {
        self.sessions.get(session_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }
}
