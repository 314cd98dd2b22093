//! Local negotiation agent
//!
//! The platform's real-time-media stack sits behind [`EndpointController`].
//! The client call only sequences it; descriptions and candidates pass
//! through untouched.

use crate::error::Result;
use async_trait::async_trait;
use callrelay_signaling_core::NegotiationPayload;
use std::fmt;

/// Media connection state reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    New,
    Checking,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// The media path is gone for good
    pub fn is_lost(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::New => "new",
            ConnectionState::Checking => "checking",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Peer connection driven by a [`ClientCall`](crate::ClientCall)
#[async_trait]
pub trait EndpointController: Send + Sync {
    /// Attach the local audio source
    ///
    /// Failure must be reported as [`ClientError::MediaUnavailable`](crate::ClientError::MediaUnavailable).
    /// Accepting a crossed call attaches again, so an already attached
    /// source must be tolerated.
    async fn attach_local_audio(&self) -> Result<()>;

    /// Produce a local offer
    async fn create_offer(&self) -> Result<NegotiationPayload>;

    /// Produce an answer to a remote offer that has already been applied
    async fn create_answer(&self, offer: &NegotiationPayload) -> Result<NegotiationPayload>;

    async fn set_local_description(&self, description: &NegotiationPayload) -> Result<()>;

    async fn set_remote_description(&self, description: &NegotiationPayload) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: &NegotiationPayload) -> Result<()>;

    /// Release local media and the peer connection
    fn close(&self);
}
