//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending
//! commands to the registry actor. Every session holds a clone.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use tokio::sync::{mpsc, oneshot};

use super::commands::{EntrySnapshot, Peer, RegistryCommand, RegistryError, RemovalReason};
use crate::server::{ConnectionId, Outbound};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
///
/// Query methods degrade to "nothing found" if the actor has stopped;
/// mutating methods that can fail report `RegistryError::ChannelClosed`.
///
/// # Usage
///
/// ```ignore
/// let handle = registry_handle.clone();
///
/// handle.register("alice".to_string(), outbound).await?;
/// let target = handle.pair("alice", "bob").await?;
/// let names = handle.list_names().await;
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    ///
    /// # Arguments
    ///
    /// * `sender` - The command channel sender for communicating with the actor
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Sends a command built around a fresh oneshot and awaits the answer.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(build(tx))
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Bind `name` to `connection`.
    ///
    /// # Errors
    ///
    /// - `RegistryError::InvalidName` if the name is blank
    /// - `RegistryError::AlreadyRegistered` if the connection owns a name
    /// - `RegistryError::NameTaken` if the name is registered
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn register(&self, name: String, connection: Outbound) -> Result<(), RegistryError> {
        self.request(|respond_to| RegistryCommand::Register {
            name,
            connection,
            respond_to,
        })
        .await?
    }

    /// Find the name owned by a connection.
    ///
    /// Returns `None` if the connection has no name or the actor has stopped.
    pub async fn lookup_by_connection(&self, connection_id: ConnectionId) -> Option<String> {
        self.request(|respond_to| RegistryCommand::LookupByConnection {
            connection_id,
            respond_to,
        })
        .await
        .ok()?
    }

    /// Pair `name` with `target`, returning the target's connection.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NotFound` if either name is missing
    /// - `RegistryError::Busy` if either side is already paired
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn pair(&self, name: &str, target: &str) -> Result<Outbound, RegistryError> {
        self.request(|respond_to| RegistryCommand::Pair {
            name: name.to_string(),
            target: target.to_string(),
            respond_to,
        })
        .await?
    }

    /// Get the peer paired with `name`.
    pub async fn peer_of(&self, name: &str) -> Option<Peer> {
        self.request(|respond_to| RegistryCommand::PeerOf {
            name: name.to_string(),
            respond_to,
        })
        .await
        .ok()?
    }

    /// Tear down the pairing of `name`, returning the former peer.
    pub async fn unpair(&self, name: &str) -> Option<Peer> {
        self.request(|respond_to| RegistryCommand::Unpair {
            name: name.to_string(),
            respond_to,
        })
        .await
        .ok()?
    }

    /// Unpair, remove, and close `name`, returning the former peer.
    ///
    /// Removing a name that is not registered is a no-op.
    pub async fn remove(&self, name: &str, reason: RemovalReason) -> Option<Peer> {
        self.request(|respond_to| RegistryCommand::Remove {
            name: name.to_string(),
            reason,
            respond_to,
        })
        .await
        .ok()?
    }

    /// Snapshot of all registered names, sorted.
    ///
    /// Returns an empty vector if the actor has stopped.
    pub async fn list_names(&self) -> Vec<String> {
        self.request(|respond_to| RegistryCommand::ListNames { respond_to })
            .await
            .unwrap_or_default()
    }

    /// Snapshot of a single entry.
    pub async fn entry(&self, name: &str) -> Option<EntrySnapshot> {
        self.request(|respond_to| RegistryCommand::GetEntry {
            name: name.to_string(),
            respond_to,
        })
        .await
        .ok()?
    }

    /// Number of registered names.
    pub async fn len(&self) -> usize {
        self.list_names().await.len()
    }

    /// Returns true if no names are registered.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_handle() -> (RegistryHandle, mpsc::Receiver<RegistryCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        (RegistryHandle::new(cmd_tx), cmd_rx)
    }

    #[tokio::test]
    async fn test_handle_is_clone() {
        let (handle, _rx) = create_test_handle();
        let _cloned = handle.clone();
    }

    #[tokio::test]
    async fn test_register_sends_command() {
        let (handle, mut rx) = create_test_handle();
        let (outbound, _out_rx) = Outbound::channel(ConnectionId::new(4));

        let cmd_handler = tokio::spawn(async move {
            if let Some(RegistryCommand::Register {
                name,
                connection,
                respond_to,
            }) = rx.recv().await
            {
                assert_eq!(name, "alice");
                assert_eq!(connection.id(), ConnectionId::new(4));
                let _ = respond_to.send(Ok(()));
                return true;
            }
            false
        });

        let result = handle.register("alice".to_string(), outbound).await;
        assert!(result.is_ok());
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_register_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        let (outbound, _out_rx) = Outbound::channel(ConnectionId::new(1));
        let result = handle.register("alice".to_string(), outbound).await;

        assert_eq!(result, Err(RegistryError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_pair_sends_command() {
        let (handle, mut rx) = create_test_handle();

        let cmd_handler = tokio::spawn(async move {
            if let Some(RegistryCommand::Pair {
                name,
                target,
                respond_to,
            }) = rx.recv().await
            {
                assert_eq!(name, "alice");
                assert_eq!(target, "bob");
                let _ = respond_to.send(Err(RegistryError::Busy(target)));
                return true;
            }
            false
        });

        let result = handle.pair("alice", "bob").await;
        assert!(matches!(result, Err(RegistryError::Busy(_))));
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_carries_reason() {
        let (handle, mut rx) = create_test_handle();

        let cmd_handler = tokio::spawn(async move {
            if let Some(RegistryCommand::Remove {
                name,
                reason,
                respond_to,
            }) = rx.recv().await
            {
                assert_eq!(name, "alice");
                assert_eq!(reason, RemovalReason::Disconnect);
                let _ = respond_to.send(None);
                return true;
            }
            false
        });

        assert!(handle.remove("alice", RemovalReason::Disconnect).await.is_none());
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_queries_degrade_on_channel_close() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        assert!(handle.lookup_by_connection(ConnectionId::new(1)).await.is_none());
        assert!(handle.peer_of("alice").await.is_none());
        assert!(handle.unpair("alice").await.is_none());
        assert!(handle.remove("alice", RemovalReason::Closed).await.is_none());
        assert!(handle.list_names().await.is_empty());
        assert!(handle.entry("alice").await.is_none());
        assert!(handle.is_empty().await);
    }
}
