//! Parley Protocol - Line protocol for the rendezvous relay
//!
//! This crate provides the wire types shared by the relay daemon
//! (`parleyd`) and the line client (`parley`):
//! - `codec` - newline framing for `tokio_util::codec`
//! - `command` - client commands parsed from a line
//! - `reply` - server replies and their exact wire literals
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod codec;
pub mod command;
pub mod reply;

pub use codec::{CodecError, LineCodec, MAX_LINE_LENGTH};
pub use command::{Command, CommandError};
pub use reply::{ErrorCode, Reply};

/// TCP port the relay listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 12345;
