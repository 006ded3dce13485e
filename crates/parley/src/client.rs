//! Interactive line client for the parley relay.
//!
//! This module provides the `LineClient` which handles:
//! - Connecting to the relay over TCP
//! - Printing every server line as `[RECV] <line>`
//! - Forwarding input lines to the server verbatim
//! - Sending `DISCONNECT` when input ends
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

use parley_protocol::{CodecError, LineCodec, DEFAULT_PORT};

// ============================================================================
// Configuration
// ============================================================================

/// Address the client connects to unless told otherwise.
pub const DEFAULT_SERVER_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT);

/// Keyword that ends the conversation from the client side.
const DISCONNECT: &str = "DISCONNECT";

/// How a client run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientExit {
    /// The user asked to disconnect (or input ended) and the server closed.
    Disconnected,
    /// The server closed the connection on its own.
    ServerClosed,
}

// ============================================================================
// Line Client
// ============================================================================

/// Client bridging a terminal (or any line source) to the relay.
///
/// Input is read line by line; blank lines are skipped. After `DISCONNECT`
/// is sent the client stops reading input and waits for the server to
/// close, so the final `DISCONNECT_OK` is still printed.
pub struct LineClient<I, O> {
    /// Line source, usually stdin
    input: FramedRead<I, LineCodec>,

    /// Where received lines are printed, usually stdout
    output: O,
}

impl<I, O> LineClient<I, O>
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    /// Creates a client over the given input and output.
    pub fn new(input: I, output: O) -> Self {
        Self {
            input: FramedRead::new(input, LineCodec::new()),
            output,
        }
    }

    /// Connects to `addr` and runs until the server closes.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Connect` if the connection cannot be opened,
    /// or any error from `run`.
    pub async fn connect_and_run(&mut self, addr: SocketAddr) -> Result<ClientExit, ClientError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect { addr, source })?;

        self.print(&format!("[CLIENT] Connected to {addr}")).await?;
        let exit = self.run(stream).await;
        self.print("[CLIENT] Closed.").await?;
        exit
    }

    /// Bridges input and output over an established connection.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the connection or output fails.
    pub async fn run<S>(&mut self, stream: S) -> Result<ClientExit, ClientError>
    where
        S: AsyncRead + AsyncWrite,
    {
        let (reader, writer) = tokio::io::split(stream);
        let mut server_lines = FramedRead::new(reader, LineCodec::new());
        let mut server_sink = FramedWrite::new(writer, LineCodec::new());
        let mut disconnecting = false;

        loop {
            tokio::select! {
                received = server_lines.next() => match received {
                    Some(Ok(line)) => self.print(&format!("[RECV] {line}")).await?,
                    Some(Err(e)) => {
                        self.print("[CLIENT] Connection error.").await?;
                        return Err(e.into());
                    }
                    None => {
                        if disconnecting {
                            return Ok(ClientExit::Disconnected);
                        }
                        self.print("[CLIENT] Server closed connection.").await?;
                        return Ok(ClientExit::ServerClosed);
                    }
                },

                typed = self.input.next(), if !disconnecting => {
                    let line = match typed {
                        Some(Ok(line)) => line,
                        Some(Err(e)) => {
                            debug!(error = %e, "Input failed, disconnecting");
                            DISCONNECT.to_string()
                        }
                        None => DISCONNECT.to_string(),
                    };

                    disconnecting = line.eq_ignore_ascii_case(DISCONNECT);
                    if let Err(e) = server_sink.send(line).await {
                        self.print("[CLIENT] Send failed.").await?;
                        return Err(e.into());
                    }
                }
            }
        }
    }

    /// Writes one line to the output.
    async fn print(&mut self, line: &str) -> Result<(), ClientError> {
        self.output.write_all(line.as_bytes()).await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await?;
        Ok(())
    }

    /// Consumes the client, returning the output.
    pub fn into_output(self) -> O {
        self.output
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not open the TCP connection.
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Framing or transport error on the connection.
    #[error("Connection error: {0}")]
    Codec(#[from] CodecError),

    /// Writing to the output failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
