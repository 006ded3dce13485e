//! Outbound half of a client connection.
//!
//! Every accepted connection gets a writer task that owns the socket's
//! write half. Everything else (the session itself, and the registry entry
//! other sessions use to reach it) holds a cheap `Outbound` handle that
//! queues replies for that task.
//!
//! Queueing never blocks, so a session can notify a slow peer without
//! stalling. The queue is bounded: a connection that falls
//! `OUTBOUND_BUFFER` replies behind is aborted, its backlog is discarded
//! and its session ends. Closing is idempotent: the writer flushes whatever
//! was queued before the close, then shuts the socket's write side down once.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Sends to a dead connection return `SendError::Closed`
//! - Sends to a full queue abort the connection and return `SendError::Overflow`

use std::fmt;

use futures::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use parley_protocol::{LineCodec, Reply};

/// Replies a connection may have queued before it counts as stalled.
pub const OUTBOUND_BUFFER: usize = 256;

/// Identifier assigned to each accepted connection by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a raw connection number.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Errors from queueing a reply on a connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("connection {0} is closed")]
    Closed(ConnectionId),

    #[error("connection {0} stopped reading and was dropped")]
    Overflow(ConnectionId),
}

/// Handle for writing replies to one connection.
#[derive(Debug, Clone)]
pub struct Outbound {
    id: ConnectionId,
    sender: mpsc::Sender<Reply>,
    closed: CancellationToken,
    aborted: CancellationToken,
}

/// Receiving side of an `Outbound`, consumed by the writer task.
#[derive(Debug)]
pub struct OutboundReceiver {
    receiver: mpsc::Receiver<Reply>,
    closed: CancellationToken,
    aborted: CancellationToken,
}

impl Outbound {
    /// Creates a handle and the receiver a writer drains.
    pub fn channel(id: ConnectionId) -> (Self, OutboundReceiver) {
        let (sender, receiver) = mpsc::channel(OUTBOUND_BUFFER);
        let closed = CancellationToken::new();
        let aborted = CancellationToken::new();
        let outbound = Self {
            id,
            sender,
            closed: closed.clone(),
            aborted: aborted.clone(),
        };
        let receiver = OutboundReceiver {
            receiver,
            closed,
            aborted,
        };
        (outbound, receiver)
    }

    /// Creates a handle backed by a writer task that owns `writer`.
    ///
    /// The returned `JoinHandle` completes after the write side has been
    /// shut down.
    pub fn spawn<W>(id: ConnectionId, writer: W) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, receiver) = Self::channel(id);
        let task = tokio::spawn(receiver.write_to(id, writer));
        (outbound, task)
    }

    /// The connection this handle writes to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a reply.
    ///
    /// # Errors
    ///
    /// Returns `SendError::Closed` if the connection was closed or its
    /// writer has stopped, and `SendError::Overflow` if the queue was full.
    /// An overflow aborts the connection.
    pub fn send(&self, reply: Reply) -> Result<(), SendError> {
        if self.closed.is_cancelled() {
            return Err(SendError::Closed(self.id));
        }
        match self.sender.try_send(reply) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(
                    connection = %self.id,
                    queued = OUTBOUND_BUFFER,
                    "Connection stopped reading, dropping it"
                );
                self.abort();
                Err(SendError::Overflow(self.id))
            }
            Err(TrySendError::Closed(_)) => Err(SendError::Closed(self.id)),
        }
    }

    /// Queues a best-effort notification; failure is logged and dropped.
    pub fn notify(&self, reply: Reply) {
        if let Err(e) = self.send(reply) {
            debug!(connection = %self.id, error = %e, "Dropped notification");
        }
    }

    /// Closes the connection. Safe to call any number of times.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Closes the connection and discards anything still queued.
    fn abort(&self) {
        self.aborted.cancel();
        self.closed.cancel();
    }

    /// Completes once the connection has been closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Returns true once the connection has been closed or its writer died.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.sender.is_closed()
    }
}

impl OutboundReceiver {
    /// Receives the next queued reply.
    ///
    /// Returns `None` once the handle has been closed and everything queued
    /// before the close has been handed out, or once all handles are gone.
    /// After an abort it returns `None` straight away.
    pub async fn recv(&mut self) -> Option<Reply> {
        tokio::select! {
            biased;
            _ = self.aborted.cancelled() => None,
            reply = self.receiver.recv() => reply,
            _ = self.closed.cancelled() => self.receiver.try_recv().ok(),
        }
    }

    /// Writer task body: frames queued replies onto `writer` until closed.
    ///
    /// An abort interrupts a write stuck on a peer that stopped reading; the
    /// write half is then dropped without flushing.
    async fn write_to<W>(mut self, id: ConnectionId, writer: W)
    where
        W: AsyncWrite + Unpin,
    {
        let aborted = self.aborted.clone();
        let mut sink = FramedWrite::new(writer, LineCodec::new());

        let drain = async {
            while let Some(reply) = self.recv().await {
                if let Err(e) = sink.send(reply).await {
                    debug!(connection = %id, error = %e, "Write failed, closing connection");
                    break;
                }
            }

            // Fail any later sends fast.
            self.closed.cancel();
            self.receiver.close();

            if let Err(e) = SinkExt::<Reply>::close(&mut sink).await {
                debug!(connection = %id, error = %e, "Shutdown of write half failed");
            }
        };

        tokio::select! {
            _ = drain => debug!(connection = %id, "Writer stopped"),
            _ = aborted.cancelled() => debug!(connection = %id, "Writer aborted"),
        }
    }
}
