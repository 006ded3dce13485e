//! Registry actor commands, errors, and results.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `Peer` / `EntrySnapshot`: Values handed back to callers
//!
//! All types are designed for async message passing and follow the panic-free policy.

use std::fmt;

use thiserror::Error;
use tokio::sync::oneshot;

use crate::server::{ConnectionId, Outbound};

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command is applied atomically: the actor processes one command at a
/// time, so no caller ever observes a half-applied pairing. Each command uses
/// a oneshot channel for the response.
///
/// # Usage
///
/// ```ignore
/// let (tx, rx) = oneshot::channel();
/// registry_tx.send(RegistryCommand::ListNames { respond_to: tx }).await?;
/// let names = rx.await?;
/// ```
#[derive(Debug)]
pub enum RegistryCommand {
    /// Bind a name to a connection.
    ///
    /// # Errors
    /// - `RegistryError::InvalidName` if the name is empty or blank
    /// - `RegistryError::AlreadyRegistered` if the connection owns a name
    /// - `RegistryError::NameTaken` if the name is registered
    Register {
        /// Name to claim
        name: String,
        /// Outbound handle owned by the new entry
        connection: Outbound,
        /// Channel to send the result
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Find the name owned by a connection (linear scan).
    LookupByConnection {
        /// Connection to look for
        connection_id: ConnectionId,
        /// Channel to send the name, if any
        respond_to: oneshot::Sender<Option<String>>,
    },

    /// Pair two registered names.
    ///
    /// Responds with the target's connection so the caller can announce the
    /// pairing.
    ///
    /// # Errors
    /// - `RegistryError::NotFound` if either name is missing
    /// - `RegistryError::Busy` if either side is already paired
    Pair {
        /// Initiating name
        name: String,
        /// Name to pair with
        target: String,
        /// Channel to send the result
        respond_to: oneshot::Sender<Result<Outbound, RegistryError>>,
    },

    /// Get the peer currently paired with a name.
    PeerOf {
        /// Name to look up
        name: String,
        /// Channel to send the peer, if any
        respond_to: oneshot::Sender<Option<Peer>>,
    },

    /// Tear down a pairing on both sides.
    ///
    /// Responds with the former peer so the caller can notify it.
    Unpair {
        /// Either member of the pair
        name: String,
        /// Channel to send the former peer, if any
        respond_to: oneshot::Sender<Option<Peer>>,
    },

    /// Unpair, delete the entry, and close its connection.
    ///
    /// A missing name is a no-op.
    Remove {
        /// Name to remove
        name: String,
        /// Why the entry is going away
        reason: RemovalReason,
        /// Channel to send the former peer, if any
        respond_to: oneshot::Sender<Option<Peer>>,
    },

    /// Snapshot all registered names.
    ListNames {
        /// Channel to send the names (sorted)
        respond_to: oneshot::Sender<Vec<String>>,
    },

    /// Snapshot a single entry.
    GetEntry {
        /// Name to look up
        name: String,
        /// Channel to send the snapshot, if any
        respond_to: oneshot::Sender<Option<EntrySnapshot>>,
    },
}

// ============================================================================
// Results
// ============================================================================

/// The other member of a pairing, as seen by a caller that must notify it.
#[derive(Debug, Clone)]
pub struct Peer {
    /// Registered name of the peer
    pub name: String,
    /// Handle for writing to the peer
    pub connection: Outbound,
}

/// Read-only view of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    /// Registered name
    pub name: String,
    /// Name of the paired peer, if any
    pub peer: Option<String>,
    /// Connection owning the name
    pub connection_id: ConnectionId,
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The requested name is empty or only whitespace.
    #[error("name must not be blank")]
    InvalidName,

    /// The connection already owns a name.
    #[error("connection already registered as {0}")]
    AlreadyRegistered(String),

    /// Another connection owns the name.
    #[error("name already taken: {0}")]
    NameTaken(String),

    /// The named client is not registered.
    #[error("client not found: {0}")]
    NotFound(String),

    /// The named client cannot be paired right now.
    #[error("client busy: {0}")]
    Busy(String),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

/// Reason why an entry was removed from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Client sent `DISCONNECT`.
    Disconnect,

    /// Client closed its connection.
    Closed,

    /// Reading from or writing to the client failed.
    TransportError,

    /// The server is shutting down.
    Shutdown,
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnect => write!(f, "client disconnected"),
            Self::Closed => write!(f, "connection closed"),
            Self::TransportError => write!(f, "transport error"),
            Self::Shutdown => write!(f, "server shutdown"),
        }
    }
}
