//! Common infrastructure for the callrelay stack
//!
//! Shared by every crate in the workspace:
//!
//! - [`logging`]: `tracing` subscriber setup
//! - [`config`]: layered configuration loading (file + environment)
//! - [`errors`]: the infrastructure error type

pub mod config;
pub mod errors;
pub mod logging;

pub use errors::types::{Error, Result};
pub use logging::setup::{log_welcome, setup_logging, LoggingConfig};
