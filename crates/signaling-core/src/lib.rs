//! # Signaling-Core
//!
//! WebRTC call signaling relay: endpoints connect over WebSocket, register
//! under an identifier, and the relay routes call control and negotiation
//! messages between the two participants of a call.
//!
//! The relay never inspects media or negotiation payloads. It tracks who is
//! online ([`callrelay_presence_core`]), which calls exist and what state they
//! are in ([`callrelay_session_core`]), and forwards messages accordingly.
//!
//! ```no_run
//! use callrelay_signaling_core::{RelayConfig, SignalingServer};
//!
//! # async fn example() -> callrelay_signaling_core::Result<()> {
//! let server = SignalingServer::bind(RelayConfig::new().with_bind_address("127.0.0.1:8080")).await?;
//! server.run().await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod router;
pub mod server;

pub use config::{RelayConfig, ENV_PREFIX};
pub use error::{Result, SignalingError};
pub use protocol::{ClientMessage, EndReason, NegotiationPayload, ServerMessage};
pub use router::{RelayStats, SignalingConnection, SignalingRouter};
pub use server::{app, SignalingServer};

pub use callrelay_presence_core::Identifier;
pub use callrelay_session_core::{ErrorKind, SessionId};
