//! callrelay signaling relay
//!
//! Configuration is layered: built-in defaults, then the optional TOML file,
//! then `CALLRELAY_*` environment variables, then command-line flags.

use anyhow::Context;
use callrelay_infra_common::{log_welcome, setup_logging};
use callrelay_signaling_core::{RelayConfig, SignalingServer};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "WebRTC call signaling relay", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (e.g. 0.0.0.0:8080)
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn apply(&self, mut config: RelayConfig) -> RelayConfig {
        if let Some(bind) = &self.bind {
            config.bind_address = bind.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.json = true;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = RelayConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;
    let config = args.apply(config);
    config.validate().context("invalid configuration")?;

    setup_logging(&config.logging).context("failed to initialize logging")?;
    log_welcome(&config.logging.app_name, env!("CARGO_PKG_VERSION"));

    let server = SignalingServer::bind(config)
        .await
        .context("failed to start signaling relay")?;
    info!("Accepting WebSocket connections on {}", server.local_addr());

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
