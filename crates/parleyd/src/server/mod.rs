//! TCP listener for the relay server.
//!
//! The server:
//! - Listens on a TCP address for client connections
//! - Assigns each connection a `ConnectionId` and spawns a `Session`
//! - Keeps track of live sessions so shutdown can wait for them
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   RelayServer   │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │     Session     │────▶│  RegistryHandle │
//! │   (per client)  │     │                 │
//! └───────┬─────────┘     └─────────────────┘
//!         │ Outbound
//!         ▼
//! ┌─────────────────┐
//! │   writer task   │
//! │  (write half)   │
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Accept errors are logged and allow continued operation

mod outbound;
mod session;

pub use outbound::{ConnectionId, Outbound, OutboundReceiver, SendError, OUTBOUND_BUFFER};
pub use session::{Session, SessionError};

use std::io;
use std::net::SocketAddr;

use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::registry::{RegistryHandle, RemovalReason};

/// TCP relay server.
///
/// Owns the listening socket and the set of running sessions.
pub struct RelayServer {
    /// Bound listener
    listener: TcpListener,

    /// Handle to the client registry
    registry: RegistryHandle,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Next connection number to hand out
    next_connection: u64,
}

impl RelayServer {
    /// Binds the listening socket.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address to listen on; port 0 picks a free port
    /// * `registry` - Handle to the client registry
    /// * `cancel_token` - Token for graceful shutdown
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if the address cannot be bound.
    pub async fn bind(
        addr: SocketAddr,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|error| ServerError::Bind { addr, error })?;

        Ok(Self {
            listener,
            registry,
            cancel_token,
            next_connection: 1,
        })
    }

    /// Returns the address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered, then
    /// waits for every session to finish its cleanup before returning.
    pub async fn run(mut self) -> Result<(), ServerError> {
        let local_addr = self.local_addr()?;
        info!(addr = %local_addr, "Relay server listening");

        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = finished {
                        error!(error = %e, "Session task failed");
                    }
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let id = self.next_connection_id();
                            debug!(connection = %id, peer = %addr, "Accepted connection");
                            sessions.spawn(self.session_for(stream, id).run());
                        }
                        Err(e) => {
                            // Continue accepting other connections
                            warn!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        self.drain(sessions).await;
        Ok(())
    }

    fn next_connection_id(&mut self) -> ConnectionId {
        let id = ConnectionId::new(self.next_connection);
        self.next_connection += 1;
        id
    }

    fn session_for(&self, stream: TcpStream, id: ConnectionId) -> Session<OwnedReadHalf> {
        Session::accept(
            stream,
            id,
            self.registry.clone(),
            self.cancel_token.child_token(),
        )
    }

    /// Waits for all sessions; each removes its own registration.
    async fn drain(&self, mut sessions: JoinSet<RemovalReason>) {
        let remaining = sessions.len();
        if remaining > 0 {
            info!(sessions = remaining, "Waiting for sessions to close");
        }

        while let Some(finished) = sessions.join_next().await {
            if let Err(e) = finished {
                error!(error = %e, "Session task failed");
            }
        }

        info!("Server cleanup complete");
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: io::Error },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
