//! Client registry using Actor pattern.
//!
//! The registry is the single source of truth for which names are
//! registered and which of them are paired. It receives commands via a
//! tokio mpsc channel and answers each on a oneshot channel.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │    Session      │────▶│  RegistryActor  │
//! │  (per client)   │     │                 │
//! └─────────────────┘     └─────────────────┘
//!         │                       │
//!         │   RegistryCommand     │   BTreeMap<name, ClientEntry>
//!         │   (mpsc channel)      │   (name → connection + peer)
//!         ▼                       ▼
//!   Outbound writes        Peer handles returned,
//!   after the reply        never written by the actor
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;

pub use actor::RegistryActor;
pub use commands::{EntrySnapshot, Peer, RegistryCommand, RegistryError, RemovalReason};
pub use handle::RegistryHandle;

/// Command channel buffer size
const COMMAND_BUFFER: usize = 100;

/// Spawn the registry actor and return a handle for interaction.
///
/// Each call creates an independent registry; tests create one per test.
/// The actor stops once every handle has been dropped.
///
/// # Example
///
/// ```no_run
/// use parleyd::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry();
///     let names = handle.list_names().await;
///     assert!(names.is_empty());
/// }
/// ```
pub fn spawn_registry() -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = RegistryActor::new(cmd_rx);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx)
}
