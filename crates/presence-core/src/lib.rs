//! # Presence-Core
//!
//! Tracks which user identifiers are currently reachable and through which
//! signaling connection.
//!
//! The transport layer owns each [`Connection`]; the [`PresenceRegistry`] only
//! keeps a weak reference to it, so a dropped connection reads as offline even
//! before the transport reports the loss.

pub mod connection;
pub mod error;
pub mod registry;
pub mod types;

pub use connection::{Connection, ConnectionId};
pub use error::{PresenceError, Result};
pub use registry::{PresenceRegistry, Registration};
pub use types::{Identifier, PresenceEntry};
