//! Newline framing for the relay line protocol.
//!
//! `LineCodec` plugs into `tokio_util::codec::{FramedRead, FramedWrite}`.
//! Inbound, it reassembles a byte stream into trimmed, non-empty lines,
//! replacing invalid UTF-8 instead of failing. Outbound, it writes replies
//! and raw command lines as UTF-8 terminated by `\n`.

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::reply::Reply;

/// Longest line (excluding the terminator) accepted from a peer: 64 KiB.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Errors produced while framing lines.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A peer sent more than `max` bytes without a line terminator.
    #[error("line too long: {len} bytes (max: {max})")]
    LineTooLong { len: usize, max: usize },

    /// I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Line codec shared by the daemon and the client.
#[derive(Debug, Clone, Default)]
pub struct LineCodec {
    /// Bytes already scanned for a terminator, so repeated reads of a long
    /// partial line stay linear.
    next_index: usize,
}

impl LineCodec {
    /// Creates a codec with an empty scan position.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, CodecError> {
        loop {
            let search_from = self.next_index.min(buf.len());
            let newline = buf
                .get(search_from..)
                .and_then(|rest| rest.iter().position(|b| *b == b'\n'));

            let Some(offset) = newline else {
                if buf.len() > MAX_LINE_LENGTH {
                    return Err(CodecError::LineTooLong {
                        len: buf.len(),
                        max: MAX_LINE_LENGTH,
                    });
                }
                self.next_index = buf.len();
                return Ok(None);
            };

            let end = search_from + offset;
            self.next_index = 0;
            let raw = buf.split_to(end + 1);

            if end > MAX_LINE_LENGTH {
                return Err(CodecError::LineTooLong {
                    len: end,
                    max: MAX_LINE_LENGTH,
                });
            }

            let body = raw.strip_suffix(b"\n").unwrap_or(raw.as_ref());
            let text = String::from_utf8_lossy(body);
            let line = text.trim();
            if line.is_empty() {
                continue;
            }
            return Ok(Some(line.to_string()));
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, CodecError> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }

        // An unterminated trailing fragment is never a command.
        if !buf.is_empty() {
            debug!(bytes = buf.len(), "Discarding unterminated line at end of stream");
            buf.clear();
        }
        self.next_index = 0;
        Ok(None)
    }
}

impl Encoder<Reply> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, reply: Reply, dst: &mut BytesMut) -> Result<(), CodecError> {
        put_line(&reply.to_string(), dst);
        Ok(())
    }
}

impl Encoder<String> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), CodecError> {
        put_line(&line, dst);
        Ok(())
    }
}

fn put_line(line: &str, dst: &mut BytesMut) {
    dst.reserve(line.len() + 1);
    dst.put_slice(line.as_bytes());
    dst.put_u8(b'\n');
}
