//! Shared harness for the relay integration tests.
//!
//! Tests CAN use `.unwrap()` and `.expect()`; production code is checked
//! through assertions on its observable behavior.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use parleyd::registry::{spawn_registry, RegistryHandle};
use parleyd::server::RelayServer;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for any single server line
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a silent connection must stay silent to count as quiet
pub const QUIET_PERIOD: Duration = Duration::from_millis(100);

/// Maximum time to wait for registry state to settle
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Interval between registry polls
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Test Server
// ============================================================================

/// A relay server on an ephemeral port with its own registry.
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: RegistryHandle,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Binds to `127.0.0.1:0` and runs the server in the background.
    pub async fn spawn() -> Self {
        let registry = spawn_registry();
        let cancel_token = CancellationToken::new();

        let server = RelayServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            registry.clone(),
            cancel_token.clone(),
        )
        .await
        .expect("bind test server");
        let addr = server.local_addr().expect("local addr");

        let task = tokio::spawn(async move {
            server.run().await.expect("server run");
        });

        Self {
            addr,
            registry,
            cancel_token,
            task,
        }
    }

    /// Opens a raw connection (nothing read yet).
    pub async fn connect_raw(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr).await.expect("connect");
        TestClient::new(stream)
    }

    /// Opens a connection and consumes the greeting.
    pub async fn connect(&self) -> TestClient {
        let mut client = self.connect_raw().await;
        client.expect("WELCOME").await;
        client
    }

    /// Opens a connection and registers `name`.
    pub async fn register(&self, name: &str) -> TestClient {
        let mut client = self.connect().await;
        client.send(&format!("REGISTER {name}")).await;
        client.expect(&format!("REGISTER_OK {name}")).await;
        client
    }

    /// Registers two clients and pairs `a` with `b`.
    pub async fn pair(&self, a: &str, b: &str) -> (TestClient, TestClient) {
        let mut first = self.register(a).await;
        let mut second = self.register(b).await;

        first.send(&format!("CONNECT {b}")).await;
        first.expect(&format!("CONNECT_OK {b}")).await;
        second.expect(&format!("INCOMING_CONNECTION {a}")).await;

        (first, second)
    }

    /// Waits until the registered names equal `expected`.
    pub async fn wait_for_names(&self, expected: &[&str]) {
        let registry = self.registry.clone();
        let expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
        eventually(|| {
            let registry = registry.clone();
            let expected = expected.clone();
            async move { registry.list_names().await == expected }
        })
        .await;
    }

    /// Cancels the server and waits for it to finish.
    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        timeout(SETTLE_TIMEOUT, self.task)
            .await
            .expect("server stops in time")
            .expect("server task");
    }
}

/// Polls `check` until it returns true or the settle timeout passes.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < SETTLE_TIMEOUT {
        if check().await {
            return;
        }
        sleep(POLL_INTERVAL).await;
    }
    panic!("condition not met within {SETTLE_TIMEOUT:?}");
}

// ============================================================================
// Test Client
// ============================================================================

/// Raw TCP client speaking the line protocol.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Sends one line (terminator added).
    pub async fn send(&mut self, line: &str) {
        self.send_raw(format!("{line}\n").as_bytes()).await;
    }

    /// Sends bytes exactly as given.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.try_send_raw(bytes).await.unwrap();
    }

    /// Sends bytes, reporting write failures instead of panicking.
    pub async fn try_send_raw(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }

    /// Receives the next line, without its terminator; `None` on EOF.
    pub async fn recv(&mut self) -> Option<String> {
        let mut line = String::new();
        let read = timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("server line within timeout");

        match read {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches('\n').to_string()),
        }
    }

    /// Asserts the next line is exactly `expected`.
    pub async fn expect(&mut self, expected: &str) {
        assert_eq!(self.recv().await.as_deref(), Some(expected));
    }

    /// Asserts the server closes the connection.
    pub async fn expect_closed(&mut self) {
        assert_eq!(self.recv().await, None);
    }

    /// Asserts nothing arrives for a short while.
    pub async fn expect_quiet(&mut self) {
        let mut line = String::new();
        let read = timeout(QUIET_PERIOD, self.reader.read_line(&mut line)).await;
        assert!(read.is_err(), "unexpected line from server: {line:?}");
    }

    /// Sends `WHO` and returns the listed names.
    pub async fn who(&mut self) -> Vec<String> {
        self.send("WHO").await;
        let line = self.recv().await.expect("USERS reply");
        let names = line.strip_prefix("USERS ").expect("USERS prefix");
        names
            .split(',')
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Closes the connection without `DISCONNECT`.
    pub fn drop_connection(self) {
        drop(self);
    }
}
