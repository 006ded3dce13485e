//! Registry actor - owns the name table and processes commands.
//!
//! The RegistryActor is the single owner of registration and pairing state.
//! It receives commands via an mpsc channel and answers on oneshot channels.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Response send failures are ignored (the caller went away)

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::commands::{EntrySnapshot, Peer, RegistryCommand, RegistryError, RemovalReason};
use crate::server::{ConnectionId, Outbound};

// ============================================================================
// Client Entry
// ============================================================================

/// One registered name.
#[derive(Debug)]
struct ClientEntry {
    /// Registered name (same as the map key)
    name: String,

    /// Outbound handle; closed exactly once, when the entry is removed
    connection: Outbound,

    /// Name of the paired peer. Always points back at this entry.
    peer: Option<String>,
}

impl ClientEntry {
    fn snapshot(&self) -> EntrySnapshot {
        EntrySnapshot {
            name: self.name.clone(),
            peer: self.peer.clone(),
            connection_id: self.connection.id(),
        }
    }
}

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all registration state.
///
/// Implements the actor pattern: receives commands via mpsc channel and
/// processes them sequentially. Sequential processing is the registry's
/// only mutual-exclusion discipline: every command sees and leaves the
/// table with all invariants intact.
///
/// # Invariants
///
/// Between any two commands:
/// - a name is a key iff its session registered it and it was not removed
/// - `a.peer == Some(b)` implies `b.peer == Some(a)`, and `b` exists
///
/// # I/O
///
/// The actor never writes to a connection. Commands that require a
/// notification hand the target's `Outbound` back to the caller.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Name table, ordered so listings are stable
    clients: BTreeMap<String, ClientEntry>,
}

impl RegistryActor {
    /// Creates a new registry actor.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Channel for receiving commands
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>) -> Self {
        Self {
            receiver,
            clients: BTreeMap::new(),
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    /// This is the main entry point - call this in a spawned task.
    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(clients = self.clients.len(), "Registry actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register {
                name,
                connection,
                respond_to,
            } => {
                let result = self.handle_register(name, connection);
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::LookupByConnection {
                connection_id,
                respond_to,
            } => {
                let result = self.name_for_connection(connection_id);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Pair {
                name,
                target,
                respond_to,
            } => {
                let result = self.handle_pair(&name, &target);
                let _ = respond_to.send(result);
            }
            RegistryCommand::PeerOf { name, respond_to } => {
                let result = self.handle_peer_of(&name);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Unpair { name, respond_to } => {
                let result = self.handle_unpair(&name);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Remove {
                name,
                reason,
                respond_to,
            } => {
                let result = self.handle_remove(&name, reason);
                let _ = respond_to.send(result);
            }
            RegistryCommand::ListNames { respond_to } => {
                let _ = respond_to.send(self.clients.keys().cloned().collect());
            }
            RegistryCommand::GetEntry { name, respond_to } => {
                let result = self.clients.get(&name).map(ClientEntry::snapshot);
                let _ = respond_to.send(result);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Handles name registration.
    ///
    /// Checks run in order: blank name, connection already registered,
    /// name taken.
    fn handle_register(
        &mut self,
        name: String,
        connection: Outbound,
    ) -> Result<(), RegistryError> {
        if name.trim().is_empty() {
            debug!(connection = %connection.id(), "Rejected blank name");
            return Err(RegistryError::InvalidName);
        }

        if let Some(existing) = self.name_for_connection(connection.id()) {
            debug!(
                connection = %connection.id(),
                existing = %existing,
                requested = %name,
                "Connection already registered"
            );
            return Err(RegistryError::AlreadyRegistered(existing));
        }

        if self.clients.contains_key(&name) {
            debug!(connection = %connection.id(), name = %name, "Name already taken");
            return Err(RegistryError::NameTaken(name));
        }

        let connection_id = connection.id();
        self.clients.insert(
            name.clone(),
            ClientEntry {
                name: name.clone(),
                connection,
                peer: None,
            },
        );

        info!(
            name = %name,
            connection = %connection_id,
            total_clients = self.clients.len(),
            "Client registered"
        );

        Ok(())
    }

    /// Finds the name owned by a connection.
    fn name_for_connection(&self, connection_id: ConnectionId) -> Option<String> {
        self.clients
            .values()
            .find(|entry| entry.connection.id() == connection_id)
            .map(|entry| entry.name.clone())
    }

    /// Pairs `name` with `target`, returning the target's connection.
    fn handle_pair(&mut self, name: &str, target: &str) -> Result<Outbound, RegistryError> {
        let Some(initiator) = self.clients.get(name) else {
            return Err(RegistryError::NotFound(name.to_string()));
        };
        let Some(recipient) = self.clients.get(target) else {
            return Err(RegistryError::NotFound(target.to_string()));
        };

        if initiator.peer.is_some() || recipient.peer.is_some() {
            debug!(
                name = %name,
                target = %target,
                initiator_peer = ?initiator.peer,
                target_peer = ?recipient.peer,
                "Pairing rejected"
            );
            return Err(RegistryError::Busy(target.to_string()));
        }

        let target_connection = recipient.connection.clone();

        if let Some(entry) = self.clients.get_mut(name) {
            entry.peer = Some(target.to_string());
        }
        if let Some(entry) = self.clients.get_mut(target) {
            entry.peer = Some(name.to_string());
        }

        info!(name = %name, target = %target, "Clients paired");
        Ok(target_connection)
    }

    /// Returns the peer of `name`, if paired.
    fn handle_peer_of(&self, name: &str) -> Option<Peer> {
        let peer_name = self.clients.get(name)?.peer.as_ref()?;
        let peer = self.clients.get(peer_name)?;

        Some(Peer {
            name: peer.name.clone(),
            connection: peer.connection.clone(),
        })
    }

    /// Clears the pairing of `name` on both sides.
    ///
    /// Returns the former peer so the caller can notify it. A name without a
    /// peer (or a missing name) is a no-op. A self-pairing has one side, so
    /// the entry itself comes back as the peer.
    fn handle_unpair(&mut self, name: &str) -> Option<Peer> {
        let entry = self.clients.get_mut(name)?;
        let peer_name = entry.peer.take()?;

        if peer_name == name {
            info!(name = %name, "Self-pairing cleared");
            return Some(Peer {
                name: peer_name,
                connection: entry.connection.clone(),
            });
        }

        let Some(peer) = self.clients.get_mut(&peer_name) else {
            warn!(name = %name, peer = %peer_name, "Pairing pointed at a missing client");
            return None;
        };

        if peer.peer.as_deref() == Some(name) {
            peer.peer = None;
        } else {
            warn!(
                name = %name,
                peer = %peer_name,
                peer_of_peer = ?peer.peer,
                "Asymmetric pairing repaired"
            );
        }

        info!(name = %name, peer = %peer_name, "Clients unpaired");

        Some(Peer {
            name: peer_name,
            connection: peer.connection.clone(),
        })
    }

    /// Unpairs and removes `name`, closing its connection.
    fn handle_remove(&mut self, name: &str, reason: RemovalReason) -> Option<Peer> {
        let peer = self.handle_unpair(name);

        match self.clients.remove(name) {
            Some(entry) => {
                entry.connection.close();
                info!(
                    name = %name,
                    connection = %entry.connection.id(),
                    reason = %reason,
                    total_clients = self.clients.len(),
                    "Client removed"
                );
            }
            None => {
                debug!(name = %name, reason = %reason, "Remove of unknown client ignored");
            }
        }

        peer
    }

    /// Returns the current number of registered clients (for testing).
    #[cfg(test)]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Checks pairing symmetry across the whole table (for testing).
    #[cfg(test)]
    fn pairing_is_symmetric(&self) -> bool {
        self.clients.values().all(|entry| match &entry.peer {
            None => true,
            Some(peer) => self
                .clients
                .get(peer)
                .is_some_and(|other| other.peer.as_deref() == Some(entry.name.as_str())),
        })
    }
}
