//! Session for an individual client connection.
//!
//! Each accepted connection gets its own `Session` that:
//! - Sends `WELCOME`
//! - Frames incoming bytes into command lines
//! - Routes commands to the registry
//! - Replies to the caller and notifies peers after each registry operation
//! - Removes its registration when the connection ends
//!
//! # State Machine
//!
//! ```text
//! Unregistered ──REGISTER──▶ Registered ──CONNECT / INCOMING──▶ Paired
//!      │                        │   ▲                              │
//!      │                        │   └─────── peer leaves ──────────┤
//!      │                        └──────────── DISCONNECT ──────────┤
//!      └──── EOF / error / dropped for not reading ───────────────▶ Closed
//! ```
//!
//! Registration and pairing live in the registry; the session asks the
//! registry who it is (`lookup_by_connection`) before every command that
//! needs a caller name. `DISCONNECT` before `REGISTER` is ignored.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::net::SocketAddr;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_protocol::{Command, ErrorCode, LineCodec, Reply};

use super::outbound::{ConnectionId, Outbound, SendError};
use crate::registry::{RegistryError, RegistryHandle, RemovalReason};

/// Whether to keep reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Session for a single client connection.
pub struct Session<R> {
    /// Framed reader for incoming command lines
    reader: FramedRead<R, LineCodec>,

    /// This connection's outbound handle
    outbound: Outbound,

    /// Writer task owning the socket's write half, if this session spawned it
    writer: Option<JoinHandle<()>>,

    /// Handle to the client registry
    registry: RegistryHandle,

    /// Remote address, for logging
    peer_addr: Option<SocketAddr>,

    /// Server-wide shutdown signal
    cancel_token: CancellationToken,
}

impl Session<OwnedReadHalf> {
    /// Creates a session for an accepted TCP connection.
    ///
    /// Splits the stream and spawns the writer task for its write half.
    pub fn accept(
        stream: TcpStream,
        connection_id: ConnectionId,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> Self {
        let peer_addr = stream.peer_addr().ok();
        let (reader, writer) = stream.into_split();
        let (outbound, writer_task) = Outbound::spawn(connection_id, writer);

        let mut session = Self::new(reader, outbound, registry, cancel_token);
        session.writer = Some(writer_task);
        session.peer_addr = peer_addr;
        session
    }
}

impl<R> Session<R>
where
    R: AsyncRead + Unpin,
{
    /// Creates a session over any byte source.
    ///
    /// # Arguments
    ///
    /// * `reader` - Inbound byte stream
    /// * `outbound` - Handle replies are queued on
    /// * `registry` - Handle to the client registry
    /// * `cancel_token` - Server shutdown signal
    pub fn new(
        reader: R,
        outbound: Outbound,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            reader: FramedRead::new(reader, LineCodec::new()),
            outbound,
            writer: None,
            registry,
            peer_addr: None,
            cancel_token,
        }
    }

    /// The connection this session serves.
    pub fn connection_id(&self) -> ConnectionId {
        self.outbound.id()
    }

    /// Runs the session until the connection ends.
    ///
    /// Returns why the session ended. By the time this returns, the
    /// session's name (if any) is gone from the registry, a former peer has
    /// been told `PEER_DISCONNECTED`, and the connection is closed.
    pub async fn run(mut self) -> RemovalReason {
        debug!(
            connection = %self.connection_id(),
            peer = ?self.peer_addr,
            "New client connected"
        );

        let reason = match self.process_lines().await {
            Ok(reason) => reason,
            Err(e) => {
                warn!(
                    connection = %self.connection_id(),
                    peer = ?self.peer_addr,
                    error = %e,
                    "Session failed"
                );
                e.removal_reason()
            }
        };

        self.close(reason).await;
        reason
    }

    /// Main command loop.
    async fn process_lines(&mut self) -> Result<RemovalReason, SessionError> {
        self.reply(Reply::Welcome)?;

        loop {
            let next = tokio::select! {
                _ = self.cancel_token.cancelled() => return Ok(RemovalReason::Shutdown),
                _ = self.outbound.closed() => {
                    debug!(connection = %self.connection_id(), "Outbound closed");
                    return Ok(RemovalReason::TransportError);
                }
                next = self.reader.next() => next,
            };

            let line = match next {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    debug!(connection = %self.connection_id(), error = %e, "Read failed");
                    return Ok(RemovalReason::TransportError);
                }
                None => {
                    debug!(connection = %self.connection_id(), "Client sent EOF");
                    return Ok(RemovalReason::Closed);
                }
            };

            if self.handle_line(&line).await? == Flow::Close {
                return Ok(RemovalReason::Disconnect);
            }
        }
    }

    /// Parses and executes one command line.
    async fn handle_line(&mut self, line: &str) -> Result<Flow, SessionError> {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                debug!(connection = %self.connection_id(), error = %e, "Unknown command");
                self.reply(Reply::Error(ErrorCode::UnknownCommand))?;
                return Ok(Flow::Continue);
            }
        };

        debug!(
            connection = %self.connection_id(),
            command = command.keyword(),
            "Received command"
        );

        match command {
            Command::Register { name } => self.handle_register(name).await?,
            Command::Ping => self.reply(Reply::Pong)?,
            Command::Connect { target } => self.handle_connect(target).await?,
            Command::Msg { text } => self.handle_msg(text).await?,
            Command::Disconnect => return self.handle_disconnect().await,
            Command::Who => {
                let names = self.registry.list_names().await;
                self.reply(Reply::Users { names })?;
            }
        }

        Ok(Flow::Continue)
    }

    /// `REGISTER <name>`
    async fn handle_register(&mut self, name: String) -> Result<(), SessionError> {
        match self.registry.register(name.clone(), self.outbound.clone()).await {
            Ok(()) => {
                info!(
                    connection = %self.connection_id(),
                    peer = ?self.peer_addr,
                    name = %name,
                    "Client registered"
                );
                self.reply(Reply::RegisterOk { name })
            }
            Err(e) => self.reject(e),
        }
    }

    /// `CONNECT <target>`
    async fn handle_connect(&mut self, target: String) -> Result<(), SessionError> {
        let Some(caller) = self.caller().await else {
            return self.reply(Reply::Error(ErrorCode::NotRegistered));
        };

        match self.registry.pair(&caller, &target).await {
            Ok(target_connection) => {
                self.reply(Reply::ConnectOk { target })?;
                target_connection.notify(Reply::IncomingConnection { name: caller });
                Ok(())
            }
            Err(e) => self.reject(e),
        }
    }

    /// `MSG <text>`
    async fn handle_msg(&mut self, text: String) -> Result<(), SessionError> {
        let Some(caller) = self.caller().await else {
            return self.reply(Reply::Error(ErrorCode::NotRegistered));
        };

        let Some(peer) = self.registry.peer_of(&caller).await else {
            return self.reply(Reply::Error(ErrorCode::NotConnected));
        };

        // The peer may be closing concurrently; that is its session's problem.
        peer.connection.notify(Reply::from_peer(caller, text));
        self.reply(Reply::MsgSent)
    }

    /// `DISCONNECT`: full teardown; the session closes afterwards.
    ///
    /// Without a registration there is nothing to tear down, so the command
    /// is ignored and the connection keeps being served.
    async fn handle_disconnect(&mut self) -> Result<Flow, SessionError> {
        let Some(caller) = self.caller().await else {
            debug!(connection = %self.connection_id(), "Disconnect before register ignored");
            return Ok(Flow::Continue);
        };

        // Queued before removal closes the connection, so it is flushed.
        self.reply(Reply::DisconnectOk)?;
        self.remove(&caller, RemovalReason::Disconnect).await;
        Ok(Flow::Close)
    }

    /// Resolves the caller's registered name.
    async fn caller(&self) -> Option<String> {
        self.registry.lookup_by_connection(self.connection_id()).await
    }

    /// Removes `name` and tells its former peer.
    async fn remove(&self, name: &str, reason: RemovalReason) {
        if let Some(peer) = self.registry.remove(name, reason).await {
            debug!(name = %name, peer = %peer.name, "Notifying former peer");
            peer.connection.notify(Reply::PeerDisconnected);
        }
    }

    /// Final cleanup: unregister, notify peer, close, wait for the writer.
    async fn close(&mut self, reason: RemovalReason) {
        if let Some(name) = self.caller().await {
            self.remove(&name, reason).await;
        }
        self.outbound.close();

        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.await {
                warn!(connection = %self.connection_id(), error = %e, "Writer task failed");
            }
        }

        info!(
            connection = %self.connection_id(),
            peer = ?self.peer_addr,
            reason = %reason,
            "Client disconnected"
        );
    }

    /// Reports a registry rejection to the caller as `ERROR <CODE>`.
    fn reject(&self, error: RegistryError) -> Result<(), SessionError> {
        match error_code(&error) {
            Some(code) => {
                debug!(connection = %self.connection_id(), error = %error, "Command rejected");
                self.reply(Reply::Error(code))
            }
            None => Err(SessionError::Registry(error)),
        }
    }

    /// Queues a reply to this connection.
    fn reply(&self, reply: Reply) -> Result<(), SessionError> {
        self.outbound.send(reply).map_err(SessionError::from)
    }
}

/// Wire code for a registry rejection; `None` for internal failures.
fn error_code(error: &RegistryError) -> Option<ErrorCode> {
    match error {
        RegistryError::InvalidName => Some(ErrorCode::InvalidName),
        RegistryError::AlreadyRegistered(_) => Some(ErrorCode::AlreadyRegistered),
        RegistryError::NameTaken(_) => Some(ErrorCode::NameTaken),
        RegistryError::NotFound(_) => Some(ErrorCode::UserNotFound),
        RegistryError::Busy(_) => Some(ErrorCode::UserBusy),
        RegistryError::ChannelClosed => None,
    }
}

/// Errors that end a session early.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Send error: {0}")]
    Send(#[from] SendError),
}

impl SessionError {
    /// How the registry should record a session that ended with this error.
    fn removal_reason(&self) -> RemovalReason {
        match self {
            Self::Registry(_) => RemovalReason::Shutdown,
            Self::Send(_) => RemovalReason::TransportError,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::time::timeout;

    use super::*;
    use crate::registry::spawn_registry;
    use crate::server::{OutboundReceiver, OUTBOUND_BUFFER};

    const RECV_TIMEOUT: Duration = Duration::from_secs(1);

    /// A session driven through an in-memory pipe.
    struct Harness {
        input: DuplexStream,
        replies: OutboundReceiver,
        task: JoinHandle<RemovalReason>,
    }

    impl Harness {
        fn spawn(id: u64, registry: &RegistryHandle, cancel_token: &CancellationToken) -> Self {
            let (input, reader) = tokio::io::duplex(4096);
            let (outbound, replies) = Outbound::channel(ConnectionId::new(id));
            let session = Session::new(reader, outbound, registry.clone(), cancel_token.clone());
            let task = tokio::spawn(session.run());
            Self {
                input,
                replies,
                task,
            }
        }

        async fn send(&mut self, line: &str) {
            self.input.write_all(line.as_bytes()).await.unwrap();
            self.input.write_all(b"\n").await.unwrap();
        }

        async fn recv(&mut self) -> Option<String> {
            timeout(RECV_TIMEOUT, self.replies.recv())
                .await
                .expect("reply within timeout")
                .map(|reply| reply.to_string())
        }

        async fn expect(&mut self, expected: &str) {
            assert_eq!(self.recv().await.as_deref(), Some(expected));
        }
    }

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            error_code(&RegistryError::NotFound("x".into())),
            Some(ErrorCode::UserNotFound)
        );
        assert_eq!(
            error_code(&RegistryError::Busy("x".into())),
            Some(ErrorCode::UserBusy)
        );
        assert_eq!(error_code(&RegistryError::ChannelClosed), None);
    }

    #[tokio::test]
    async fn test_welcome_then_register() {
        let registry = spawn_registry();
        let cancel = CancellationToken::new();
        let mut alice = Harness::spawn(1, &registry, &cancel);

        alice.expect("WELCOME").await;
        alice.send("REGISTER alice").await;
        alice.expect("REGISTER_OK alice").await;

        assert_eq!(registry.list_names().await, vec!["alice"]);
    }

    #[tokio::test]
    async fn test_commands_before_register() {
        let registry = spawn_registry();
        let cancel = CancellationToken::new();
        let mut client = Harness::spawn(1, &registry, &cancel);
        client.expect("WELCOME").await;

        client.send("PING").await;
        client.expect("PONG").await;
        client.send("CONNECT bob").await;
        client.expect("ERROR NOT_REGISTERED").await;
        client.send("MSG hi").await;
        client.expect("ERROR NOT_REGISTERED").await;
        client.send("WHO").await;
        client.expect("USERS ").await;
        client.send("JUMP").await;
        client.expect("ERROR UNKNOWN_COMMAND").await;
    }

    #[tokio::test]
    async fn test_register_twice() {
        let registry = spawn_registry();
        let cancel = CancellationToken::new();
        let mut client = Harness::spawn(1, &registry, &cancel);
        client.expect("WELCOME").await;

        client.send("REGISTER alice").await;
        client.expect("REGISTER_OK alice").await;
        client.send("REGISTER other").await;
        client.expect("ERROR ALREADY_REGISTERED").await;
    }

    #[tokio::test]
    async fn test_pair_message_and_disconnect() {
        let registry = spawn_registry();
        let cancel = CancellationToken::new();
        let mut alice = Harness::spawn(1, &registry, &cancel);
        let mut bob = Harness::spawn(2, &registry, &cancel);
        alice.expect("WELCOME").await;
        bob.expect("WELCOME").await;

        alice.send("REGISTER alice").await;
        alice.expect("REGISTER_OK alice").await;
        bob.send("REGISTER bob").await;
        bob.expect("REGISTER_OK bob").await;

        alice.send("MSG too early").await;
        alice.expect("ERROR NOT_CONNECTED").await;

        alice.send("CONNECT bob").await;
        alice.expect("CONNECT_OK bob").await;
        bob.expect("INCOMING_CONNECTION alice").await;

        bob.send("msg hello  there").await;
        alice.expect("FROM bob: hello  there").await;
        bob.expect("MSG_SENT").await;

        alice.send("DISCONNECT").await;
        alice.expect("DISCONNECT_OK").await;
        bob.expect("PEER_DISCONNECTED").await;

        assert_eq!(alice.task.await.unwrap(), RemovalReason::Disconnect);
        assert_eq!(registry.list_names().await, vec!["bob"]);
        assert_eq!(registry.entry("bob").await.unwrap().peer, None);
    }

    #[tokio::test]
    async fn test_disconnect_unregistered_is_ignored() {
        let registry = spawn_registry();
        let cancel = CancellationToken::new();
        let mut client = Harness::spawn(1, &registry, &cancel);
        client.expect("WELCOME").await;

        client.send("DISCONNECT").await;
        client.send("PING").await;
        client.expect("PONG").await;
        assert!(!client.task.is_finished());

        client.send("REGISTER alice").await;
        client.expect("REGISTER_OK alice").await;
        client.send("DISCONNECT").await;
        client.expect("DISCONNECT_OK").await;
        assert_eq!(client.task.await.unwrap(), RemovalReason::Disconnect);
    }

    #[tokio::test]
    async fn test_self_pairing_relays_to_self() {
        let registry = spawn_registry();
        let cancel = CancellationToken::new();
        let mut alice = Harness::spawn(1, &registry, &cancel);
        alice.expect("WELCOME").await;
        alice.send("REGISTER alice").await;
        alice.expect("REGISTER_OK alice").await;

        alice.send("CONNECT alice").await;
        alice.expect("CONNECT_OK alice").await;
        alice.expect("INCOMING_CONNECTION alice").await;

        alice.send("MSG echo").await;
        alice.expect("FROM alice: echo").await;
        alice.expect("MSG_SENT").await;
    }

    #[tokio::test]
    async fn test_peer_that_stops_reading_is_dropped() {
        let registry = spawn_registry();
        let cancel = CancellationToken::new();
        let mut alice = Harness::spawn(1, &registry, &cancel);
        let mut bob = Harness::spawn(2, &registry, &cancel);
        alice.expect("WELCOME").await;
        bob.expect("WELCOME").await;
        alice.send("REGISTER alice").await;
        alice.expect("REGISTER_OK alice").await;
        bob.send("REGISTER bob").await;
        bob.expect("REGISTER_OK bob").await;
        alice.send("CONNECT bob").await;
        alice.expect("CONNECT_OK bob").await;
        bob.expect("INCOMING_CONNECTION alice").await;

        // Bob never reads again; one message past his queue drops him.
        for i in 0..=OUTBOUND_BUFFER {
            alice.send(&format!("MSG line {i}")).await;
            alice.expect("MSG_SENT").await;
        }

        alice.expect("PEER_DISCONNECTED").await;
        assert_eq!(bob.task.await.unwrap(), RemovalReason::TransportError);
        assert_eq!(registry.list_names().await, vec!["alice"]);
    }

    #[tokio::test]
    async fn test_eof_removes_registration() {
        let registry = spawn_registry();
        let cancel = CancellationToken::new();
        let mut client = Harness::spawn(1, &registry, &cancel);
        client.expect("WELCOME").await;
        client.send("REGISTER alice").await;
        client.expect("REGISTER_OK alice").await;

        client.input.shutdown().await.unwrap();

        assert_eq!(client.task.await.unwrap(), RemovalReason::Closed);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_shutdown_token_ends_session() {
        let registry = spawn_registry();
        let cancel = CancellationToken::new();
        let mut client = Harness::spawn(1, &registry, &cancel);
        client.expect("WELCOME").await;
        client.send("REGISTER alice").await;
        client.expect("REGISTER_OK alice").await;

        cancel.cancel();

        assert_eq!(client.task.await.unwrap(), RemovalReason::Shutdown);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_session_error_removal_reason() {
        let err = SessionError::from(SendError::Closed(ConnectionId::new(1)));
        assert_eq!(err.removal_reason(), RemovalReason::TransportError);
        assert!(err.to_string().contains("conn-1"));

        let err = SessionError::from(RegistryError::ChannelClosed);
        assert_eq!(err.removal_reason(), RemovalReason::Shutdown);
    }
}
