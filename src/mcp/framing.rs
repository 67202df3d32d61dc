//! Newline framing for the server's stdout.
//!
//! The stdio transport has no length prefix: each message is one line of
//! UTF-8 JSON terminated by `\n`. Reads from the pipe, however, arrive in
//! arbitrary chunks. [`FrameReader`] keeps the unterminated tail of the last
//! chunk and only decodes a line once its newline has been seen, so a message
//! split across reads (or a multi-byte character split across reads) is
//! reassembled before parsing.
//!
//! Servers commonly print banners or progress text on stdout before protocol
//! traffic starts. Such lines are logged and skipped, never fatal.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tracing::warn;

use crate::error::DecodeError;
use crate::mcp::protocol::{parse_message, Message};

/// Maximum line length accepted by the reader: 16 MiB.
///
/// Full documentation sets arrive as a single line, so this is far larger
/// than a typical message. An unterminated line that grows past it is
/// dropped and the reader resynchronises on the next newline.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Incremental decoder turning stdout chunks into JSON-RPC messages.
///
/// Line splitting, `\r` stripping and the length limit are delegated to
/// [`LinesCodec`]; this type adds JSON-RPC decoding and noise accounting.
#[derive(Debug)]
pub struct FrameReader {
    /// Bytes not yet consumed by the codec.
    buffer: BytesMut,
    codec: LinesCodec,
    /// Lines that were not valid messages.
    discarded: usize,
}

impl FrameReader {
    /// Creates a reader with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line_bytes(MAX_LINE_BYTES)
    }

    /// Creates a reader with a custom line limit.
    #[must_use]
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            codec: LinesCodec::new_with_max_length(max_line_bytes),
            discarded: 0,
        }
    }

    /// Consumes one chunk and returns every message it completes, in order.
    ///
    /// Never fails: lines that do not decode are logged and counted in
    /// [`discarded`](Self::discarded).
    pub fn feed(&mut self, chunk: impl AsRef<[u8]>) -> Vec<Message> {
        self.buffer.extend_from_slice(chunk.as_ref());

        let mut messages = Vec::new();
        loop {
            let line = self.codec.decode(&mut self.buffer);
            if !self.accept(line, &mut messages) {
                break;
            }
        }
        messages
    }

    /// Decodes whatever unterminated line is left once the stream has ended.
    pub fn finish(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        loop {
            let line = self.codec.decode_eof(&mut self.buffer);
            if !self.accept(line, &mut messages) {
                break;
            }
        }
        self.reset();
        messages
    }

    /// Discards any buffered partial line.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.codec = LinesCodec::new_with_max_length(self.codec.max_length());
    }

    /// Number of bytes waiting for a newline.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Number of non-blank lines skipped because they were not messages.
    #[must_use]
    pub const fn discarded(&self) -> usize {
        self.discarded
    }

    /// Handles one codec result, pushing a decoded message if there is one.
    ///
    /// Returns `false` once the codec needs more input.
    fn accept(
        &mut self,
        line: Result<Option<String>, LinesCodecError>,
        messages: &mut Vec<Message>,
    ) -> bool {
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => return false,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                let error = DecodeError::LineTooLong {
                    limit: self.codec.max_length(),
                };
                warn!(error = %error, "Dropping oversized line from server");
                self.discarded += 1;
                return true;
            }
            Err(LinesCodecError::Io(e)) => {
                warn!(
                    error = %DecodeError::NotUtf8,
                    cause = %e,
                    "Skipping undecodable line from server"
                );
                self.discarded += 1;
                return true;
            }
        };

        if line.trim().is_empty() {
            return true;
        }

        match parse_message(line.as_bytes()) {
            Ok(message) => messages.push(message),
            Err(error) => {
                warn!(
                    error = %error,
                    line = %line.trim(),
                    "Non-JSON-RPC output from server, skipping"
                );
                self.discarded += 1;
            }
        }
        true
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}
