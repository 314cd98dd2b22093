//! Presence data types

use crate::connection::{Connection, ConnectionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};

/// Caller-chosen name of an endpoint
///
/// Opaque: no format or uniqueness is enforced beyond "last registration wins".
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(pub String);

impl Identifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Binding of an identifier to the connection currently serving it
pub struct PresenceEntry<M> {
    pub identifier: Identifier,
    pub connection_id: ConnectionId,
    /// Non-owning; the transport decides when the connection dies
    pub connection: Weak<Connection<M>>,
    pub registered_at: DateTime<Utc>,
}

impl<M> PresenceEntry<M> {
    pub fn new(identifier: Identifier, connection: &Arc<Connection<M>>) -> Self {
        Self {
            identifier,
            connection_id: connection.id(),
            connection: Arc::downgrade(connection),
            registered_at: Utc::now(),
        }
    }

    /// The live connection, if the transport still holds it
    pub fn connection(&self) -> Option<Arc<Connection<M>>> {
        self.connection.upgrade().filter(|conn| !conn.is_closed())
    }
}

impl<M> Clone for PresenceEntry<M> {
    fn clone(&self) -> Self {
        Self {
            identifier: self.identifier.clone(),
            connection_id: self.connection_id,
            connection: self.connection.clone(),
            registered_at: self.registered_at,
        }
    }
}

impl<M> fmt::Debug for PresenceEntry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceEntry")
            .field("identifier", &self.identifier)
            .field("connection_id", &self.connection_id)
            .field("registered_at", &self.registered_at)
            .finish()
    }
}
