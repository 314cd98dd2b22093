//! # Session-Core
//!
//! Call session store and state machine for the callrelay signaling relay.
//!
//! A session is created when a caller rings a reachable receiver and walks
//! through `ringing → accepted → negotiating → active → ended`, with
//! `rejected` and `failed` as the other terminal states. The store enforces
//! that an identifier is in at most one live session at a time, which is also
//! what resolves glare between two crossing call requests.
//!
//! The store never touches connections. It answers "may this happen" and
//! "who should hear about it"; delivering messages is the signaling router's
//! job.

pub mod errors;
mod ledger;
pub mod state_table;
pub mod store;
pub mod types;

pub use errors::{CallError, ErrorKind, Result};
pub use ledger::DEFAULT_RETENTION;
pub use state_table::{StateTable, MASTER_TABLE};
pub use store::{ConnectedOutcome, EndOutcome, Reachability, RelayOutcome, SessionStore};
pub use types::{CallEvent, CallSession, CallState, ConnectedReports, Role, SessionId, SessionStats};

pub use callrelay_presence_core::Identifier;
