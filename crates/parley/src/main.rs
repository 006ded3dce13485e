//! Parley - Interactive line client for the relay
//!
//! Reads commands from stdin, sends them to the relay, and prints every
//! server line as `[RECV] <line>`.
//!
//! # Usage
//!
//! ```text
//! parley                          # connect to 127.0.0.1:12345
//! parley --addr 10.0.0.5:4000     # connect elsewhere
//! PARLEY_ADDR=10.0.0.5:4000 parley
//! RUST_LOG=parley=debug parley    # log to stderr
//! ```

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use parley::{ClientExit, LineClient, DEFAULT_SERVER_ADDR};

// ============================================================================
// CLI Arguments
// ============================================================================

/// Parley - line chat client
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Talk to a parley relay from the terminal")]
#[command(version)]
struct Args {
    /// Relay address (overrides PARLEY_ADDR)
    #[arg(short, long)]
    addr: Option<String>,
}

/// Environment variable naming the relay address.
const ADDR_ENV: &str = "PARLEY_ADDR";

/// Resolves the relay address: flag, then environment, then default.
fn resolve_addr(flag: Option<String>) -> Result<SocketAddr> {
    match flag.or_else(|| std::env::var(ADDR_ENV).ok()) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid relay address '{raw}' (expected host:port)")),
        None => Ok(DEFAULT_SERVER_ADDR),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so they never mix with received lines.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("parley=warn".parse()?)
                .add_directive("parley_protocol=warn".parse()?),
        )
        .init();

    let addr = resolve_addr(args.addr)?;

    let mut client = LineClient::new(tokio::io::stdin(), tokio::io::stdout());
    let exit = client
        .connect_and_run(addr)
        .await
        .with_context(|| format!("Session with {addr} failed"))?;

    tracing::debug!(?exit, "Client finished");
    if exit == ClientExit::ServerClosed {
        tracing::info!("Server ended the session");
    }
    Ok(())
}
