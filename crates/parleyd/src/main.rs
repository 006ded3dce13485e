//! Parley Daemon - Rendezvous and relay server
//!
//! Accepts TCP clients, lets them register names, pairs them on request,
//! and relays text lines between paired clients.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default address (127.0.0.1:12345)
//! parleyd
//!
//! # Listen on a custom address
//! parleyd --addr 0.0.0.0:4000
//! PARLEY_ADDR=0.0.0.0:4000 parleyd
//!
//! # Enable debug logging
//! RUST_LOG=parleyd=debug parleyd
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use parleyd::config::ServerConfig;
use parleyd::registry::spawn_registry;
use parleyd::server::RelayServer;

/// Parley daemon - line chat rendezvous and relay
#[derive(Parser, Debug)]
#[command(name = "parleyd", version, about)]
struct Args {
    /// Address to listen on (overrides PARLEY_ADDR)
    #[arg(short, long)]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("parleyd=info".parse()?)
                .add_directive("parley_protocol=info".parse()?),
        )
        .init();

    let config = ServerConfig::from_env()
        .and_then(|config| config.with_addr_override(args.addr.as_deref()))
        .context("Invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        addr = %config.addr,
        "Parley daemon starting"
    );

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    // Setup signal handlers
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = spawn_registry();
    info!("Client registry started");

    let server = RelayServer::bind(config.addr, registry, cancel_token)
        .await
        .with_context(|| format!("Failed to start server on {}", config.addr))?;

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Parley daemon stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
