//! # Client-Core
//!
//! Endpoint side of a callrelay call. [`ClientCall`] tracks one call as the
//! endpoint sees it and sequences the platform's negotiation agent, exposed
//! as the [`EndpointController`] trait, against the messages exchanged with
//! the relay.
//!
//! The crate does no I/O of its own: feed relay messages into
//! [`ClientCall::handle`] and send whatever it returns.

pub mod call;
pub mod controller;
pub mod error;

pub use call::{CallDirection, CallOutcome, ClientCall, ClientCallState};
pub use controller::{ConnectionState, EndpointController};
pub use error::{ClientError, Result};
