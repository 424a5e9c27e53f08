//! Secure port server.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────┐
//!                     │                    SERVER                    │
//!   Client            │  ┌──────────┐   ┌───────────┐   ┌──────────┐ │
//!   ──────────────────┼─▶│   net    │──▶│   port    │──▶│transport │ │
//!   TCP connect       │  │ listener │   │ handshake │   │ factory  │ │
//!                     │  └──────────┘   └─────┬─────┘   └──────────┘ │
//!                     │                       │                      │
//!                     │                 ┌─────▼─────┐                │
//!                     │                 │ security  │                │
//!                     │                 │  context  │                │
//!                     │                 └───────────┘                │
//!                     │  config · observability · lifecycle          │
//!                     └──────────────────────────────────────────────┘
//! ```
//!
//! Serves the echo transport on every configured listener until SIGINT or
//! SIGTERM.

use std::path::PathBuf;

use clap::Parser;

use secure_port::config::load_config;
use secure_port::lifecycle::{self, Shutdown};
use secure_port::observability::{logging, metrics};
use secure_port::transport::EchoTransport;

#[derive(Parser)]
#[command(name = "secure-port")]
#[command(about = "Serve secure listening ports from a TOML config", long_about = None)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "secure-port.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        listeners = config.listeners.len(),
        "secure-port starting"
    );

    if config.observability.metrics_enabled {
        // Validation has already checked the address.
        if let Ok(addr) = config.observability.metrics_address.parse() {
            if let Err(e) = metrics::init_metrics(addr) {
                tracing::error!(error = %e, "Failed to install metrics exporter");
            }
        }
    }

    let server = lifecycle::build_server(&config, EchoTransport)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "Startup failed"))?;

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    lifecycle::spawn_signal_handler(shutdown);

    lifecycle::run(server, shutdown_rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
