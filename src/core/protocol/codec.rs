// src/core/protocol/codec.rs

//! Newline-delimited framing for JSON messages.
//!
//! Each message travels as one UTF-8 JSON object followed by `\n`. The decoder
//! only splits frames; it never parses JSON, so a malformed payload costs the
//! client that one message and nothing more.

use super::message::ServerMessage;
use crate::core::RelayError;
use bytes::{BufMut, Bytes, BytesMut};
use std::cmp;
use tokio_util::codec::{Decoder, Encoder};

/// Default upper bound on a single frame, excluding the terminator.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

const DELIMITER: u8 = b'\n';

/// A `tokio_util::codec` implementation for newline-delimited message frames.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_length: usize,
    /// Where to resume scanning for the delimiter on the next `decode` call.
    next_index: usize,
}

impl MessageCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

/// Strips a trailing `\r` and reports whether anything but whitespace is left.
fn trim_frame(frame: &mut BytesMut) -> bool {
    if frame.last() == Some(&b'\r') {
        frame.truncate(frame.len() - 1);
    }
    !frame.iter().all(u8::is_ascii_whitespace)
}

impl Decoder for MessageCodec {
    type Item = Bytes;
    type Error = RelayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            // Never look further than one byte past the limit.
            let read_to = cmp::min(self.max_length.saturating_add(1), src.len());
            let delimiter_at = src[self.next_index..read_to]
                .iter()
                .position(|b| *b == DELIMITER);

            match delimiter_at {
                Some(offset) => {
                    let index = self.next_index + offset;
                    self.next_index = 0;
                    let mut frame = src.split_to(index + 1);
                    frame.truncate(index);
                    if trim_frame(&mut frame) {
                        return Ok(Some(frame.freeze()));
                    }
                    // Blank line, keep scanning.
                }
                None if src.len() > self.max_length => {
                    return Err(RelayError::MessageTooLong {
                        len: src.len(),
                        max: self.max_length,
                    });
                }
                None => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        self.next_index = 0;
        if src.is_empty() {
            return Ok(None);
        }
        // The peer closed without a final terminator.
        let mut frame = src.split_to(src.len());
        if trim_frame(&mut frame) {
            Ok(Some(frame.freeze()))
        } else {
            Ok(None)
        }
    }
}

impl Encoder<Bytes> for MessageCodec {
    type Error = RelayError;

    /// Writes an already-serialized payload (a relayed frame or a queued
    /// server message) followed by the terminator.
    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len() + 1);
        dst.extend_from_slice(&item);
        dst.put_u8(DELIMITER);
        Ok(())
    }
}

impl Encoder<ServerMessage> for MessageCodec {
    type Error = RelayError;

    fn encode(&mut self, item: ServerMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(&item)?;
        dst.reserve(body.len() + 1);
        dst.extend_from_slice(&body);
        dst.put_u8(DELIMITER);
        Ok(())
    }
}
