//! Identifier → connection registry

use crate::connection::{Connection, ConnectionId};
use crate::types::{Identifier, PresenceEntry};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// What a registration displaced
///
/// The registry itself knows nothing about calls; the caller uses this to
/// fail any session a displaced participant was part of.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registration {
    /// Another connection that held the identifier until now
    pub superseded: Option<ConnectionId>,
    /// Identifier this connection held before re-joining under a new one
    pub previous_identifier: Option<Identifier>,
}

impl Registration {
    pub fn displaced_anything(&self) -> bool {
        self.superseded.is_some() || self.previous_identifier.is_some()
    }
}

/// In-memory presence registry
///
/// At most one entry per identifier and at most one identifier per connection.
pub struct PresenceRegistry<M> {
    /// Map of identifier to its current binding
    entries: DashMap<Identifier, PresenceEntry<M>>,
    /// Reverse index used when the transport reports a lost connection
    by_connection: DashMap<ConnectionId, Identifier>,
}

impl<M> PresenceRegistry<M> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            by_connection: DashMap::new(),
        }
    }

    /// Bind `identifier` to `connection`, replacing any prior binding
    pub fn register(&self, identifier: Identifier, connection: &Arc<Connection<M>>) -> Registration {
        let conn_id = connection.id();
        let mut registration = Registration::default();

        // A connection re-joining under a new name gives up the old one
        if let Some((_, old_identifier)) = self.by_connection.remove(&conn_id) {
            if old_identifier != identifier {
                self.entries
                    .remove_if(&old_identifier, |_, entry| entry.connection_id == conn_id);
                debug!("{} released identifier {}", conn_id, old_identifier);
                registration.previous_identifier = Some(old_identifier);
            }
        }

        let entry = PresenceEntry::new(identifier.clone(), connection);
        if let Some(old) = self.entries.insert(identifier.clone(), entry) {
            if old.connection_id != conn_id {
                self.by_connection.remove(&old.connection_id);
                info!(
                    "Identifier {} moved from {} to {}",
                    identifier, old.connection_id, conn_id
                );
                registration.superseded = Some(old.connection_id);
            }
        }
        self.by_connection.insert(conn_id, identifier.clone());

        info!("Registered {} on {}", identifier, conn_id);
        registration
    }

    /// Current live connection for `identifier`
    pub fn lookup(&self, identifier: &Identifier) -> Option<Arc<Connection<M>>> {
        self.entries.get(identifier).and_then(|entry| entry.connection())
    }

    /// Whether `identifier` is bound to a live connection
    pub fn is_online(&self, identifier: &Identifier) -> bool {
        self.lookup(identifier).is_some()
    }

    /// Identifier currently held by a connection
    pub fn identifier_of(&self, conn_id: &ConnectionId) -> Option<Identifier> {
        self.by_connection.get(conn_id).map(|entry| entry.value().clone())
    }

    /// Snapshot of an identifier's binding
    pub fn entry(&self, identifier: &Identifier) -> Option<PresenceEntry<M>> {
        self.entries.get(identifier).map(|entry| entry.value().clone())
    }

    /// Remove the binding held by a lost connection
    ///
    /// Returns the identifier that went offline. A connection whose identifier
    /// was already taken over by another connection releases nothing.
    pub fn unregister_connection(&self, conn_id: &ConnectionId) -> Option<Identifier> {
        let (_, identifier) = self.by_connection.remove(conn_id)?;
        self.entries
            .remove_if(&identifier, |_, entry| entry.connection_id == *conn_id)
            .map(|(identifier, _)| {
                info!("Unregistered {} ({})", identifier, conn_id);
                identifier
            })
    }

    /// Remove an identifier's binding regardless of which connection holds it
    pub fn unregister(&self, identifier: &Identifier) -> Option<ConnectionId> {
        let (_, entry) = self.entries.remove(identifier)?;
        self.by_connection
            .remove_if(&entry.connection_id, |_, held| held == identifier);
        info!("Unregistered {} ({})", identifier, entry.connection_id);
        Some(entry.connection_id)
    }

    /// List all identifiers with a binding
    pub fn list_identifiers(&self) -> Vec<Identifier> {
        let mut ids: Vec<Identifier> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
