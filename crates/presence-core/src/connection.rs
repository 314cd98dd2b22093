//! Live signaling connection handle

use crate::error::{PresenceError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::trace;

/// Unique id of a transport connection
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConnectionId(pub uuid::Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outbound half of a bidirectional channel to one endpoint
///
/// Messages are queued on an unbounded channel drained by the transport's
/// writer task, so sending never blocks the caller.
pub struct Connection<M> {
    id: ConnectionId,
    remote_addr: Option<SocketAddr>,
    opened_at: DateTime<Utc>,
    outbound: mpsc::UnboundedSender<M>,
    closed: AtomicBool,
}

impl<M> Connection<M> {
    /// Create a connection and the receiver its writer task drains
    pub fn new(remote_addr: Option<SocketAddr>) -> (Self, mpsc::UnboundedReceiver<M>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let conn = Self {
            id: ConnectionId::new(),
            remote_addr,
            opened_at: Utc::now(),
            outbound,
            closed: AtomicBool::new(false),
        };
        (conn, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Queue a message for delivery
    pub fn send(&self, message: M) -> Result<()> {
        if self.is_closed() {
            return Err(PresenceError::ConnectionClosed(self.id));
        }
        self.outbound.send(message).map_err(|_| {
            self.closed.store(true, Ordering::Relaxed);
            PresenceError::ConnectionClosed(self.id)
        })?;
        trace!("Queued outbound message on {}", self.id);
        Ok(())
    }

    /// Mark the connection closed; later sends fail
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed) || self.outbound.is_closed()
    }
}

impl<M> fmt::Debug for Connection<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}
