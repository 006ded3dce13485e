//! Parley - Line client library
//!
//! This library provides the interactive client for the parley relay:
//! lines typed by the user go to the server as commands, and every line the
//! server sends back is printed as `[RECV] <line>`.
//!
//! # Architecture
//!
//! A single task multiplexes two framed streams with `tokio::select!`:
//!
//! 1. **Server lines**: decoded with `LineCodec` and printed
//! 2. **Input lines**: decoded with `LineCodec` and forwarded
//!
//! Input ending (or a typed `DISCONNECT`) sends `DISCONNECT`; the client then
//! waits for the server to close the connection.

pub mod client;

// Re-export commonly used types
pub use client::{ClientError, ClientExit, LineClient, DEFAULT_SERVER_ADDR};
