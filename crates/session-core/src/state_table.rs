//! Transition table for call sessions
//!
//! Single source of truth for which events are legal in which state. Guards
//! that depend on session data (who sent the offer, whether both sides have
//! reported connected) live in the store; the table only knows states.

use crate::types::{CallEvent, CallState};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Key for looking up transitions in the state table
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct StateKey {
    pub state: CallState,
    pub event: CallEvent,
}

/// The master state table
pub static MASTER_TABLE: Lazy<StateTable> = Lazy::new(StateTable::build);

#[derive(Debug)]
pub struct StateTable {
    transitions: HashMap<StateKey, CallState>,
}

const LIVE_STATES: [CallState; 4] = [
    CallState::Ringing,
    CallState::Accepted,
    CallState::Negotiating,
    CallState::Active,
];

impl StateTable {
    fn build() -> Self {
        let mut table = Self {
            transitions: HashMap::new(),
        };

        table.insert(CallState::Ringing, CallEvent::Accept, CallState::Accepted);
        table.insert(CallState::Ringing, CallEvent::Reject, CallState::Rejected);

        table.insert(CallState::Accepted, CallEvent::Offer, CallState::Negotiating);
        table.insert(CallState::Negotiating, CallEvent::Offer, CallState::Negotiating);
        table.insert(CallState::Negotiating, CallEvent::Answer, CallState::Negotiating);
        // Only taken once both participants have reported
        table.insert(CallState::Negotiating, CallEvent::MediaConnected, CallState::Active);
        table.insert(CallState::Active, CallEvent::MediaConnected, CallState::Active);

        for state in LIVE_STATES {
            table.insert(state, CallEvent::Candidate, state);
            table.insert(state, CallEvent::Hangup, CallState::Ended);
            table.insert(state, CallEvent::ParticipantLost, CallState::Failed);
        }

        table
    }

    fn insert(&mut self, state: CallState, event: CallEvent, next: CallState) {
        self.transitions.insert(StateKey { state, event }, next);
    }

    /// Next state for `event` in `state`, or `None` if the event is not allowed
    pub fn next_state(&self, state: CallState, event: CallEvent) -> Option<CallState> {
        self.transitions.get(&StateKey { state, event }).copied()
    }

    pub fn allows(&self, state: CallState, event: CallEvent) -> bool {
        self.next_state(state, event).is_some()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }
}
