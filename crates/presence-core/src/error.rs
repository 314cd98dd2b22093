//! Error types for presence operations

use crate::connection::ConnectionId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PresenceError {
    #[error("Connection {0} is closed")]
    ConnectionClosed(ConnectionId),
}

pub type Result<T> = std::result::Result<T, PresenceError>;
