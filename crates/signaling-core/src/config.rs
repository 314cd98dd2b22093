//! Relay server configuration

use crate::error::{Result, SignalingError};
use callrelay_infra_common::LoggingConfig;
use callrelay_session_core::DEFAULT_RETENTION;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "CALLRELAY";

/// Main configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the HTTP/WebSocket listener binds to
    pub bind_address: String,
    /// Path of the WebSocket upgrade endpoint
    pub ws_path: String,
    /// How many terminated sessions to remember for late messages
    pub terminated_session_retention: usize,
    pub logging: LoggingConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            ws_path: "/ws".to_string(),
            terminated_session_retention: DEFAULT_RETENTION,
            logging: LoggingConfig::default(),
        }
    }
}

impl RelayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from an optional TOML file layered under `CALLRELAY_*` variables
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config: Self = callrelay_infra_common::config::load_layered(file, ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    pub fn with_ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.terminated_session_retention = retention;
        self
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_address.parse().map_err(|_| {
            SignalingError::Config(format!("Invalid bind address: {}", self.bind_address))
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        if !self.ws_path.starts_with('/') {
            return Err(SignalingError::Config(format!(
                "WebSocket path must start with '/': {}",
                self.ws_path
            )));
        }
        if matches!(self.ws_path.as_str(), "/health" | "/stats") {
            return Err(SignalingError::Config(format!(
                "WebSocket path collides with a built-in route: {}",
                self.ws_path
            )));
        }
        callrelay_infra_common::logging::parse_log_level(&self.logging.level)?;
        Ok(())
    }
}
