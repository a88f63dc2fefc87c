//! Line codec for tokio.
//!
//! Reads newline-terminated requests and writes newline-terminated
//! replies. Input bytes that aren't valid UTF-8 are replaced with U+FFFD
//! instead of failing the connection.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::AppError;
use crate::message::Reply;

/// Newline-delimited codec with a maximum line length.
///
/// The limit counts the line's bytes, newline excluded.
#[derive(Debug, Clone)]
pub struct LineCodec {
    /// Index of next byte to check for newline
    next_index: usize,
    /// Maximum line length
    max_len: usize,
}

impl LineCodec {
    pub fn new(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }
}

/// Drop a trailing `\r` and decode, substituting invalid sequences
fn to_text(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, AppError> {
        // Look for newline starting from where we left off
        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') {
            let end = self.next_index + offset;
            self.next_index = 0;

            if end > self.max_len {
                return Err(AppError::LineTooLong(self.max_len));
            }

            let line = src.split_to(end + 1);
            return Ok(Some(to_text(&line[..end])));
        }

        // Partial line already over the limit: no point waiting for the rest
        if src.len() > self.max_len {
            return Err(AppError::LineTooLong(self.max_len));
        }

        self.next_index = src.len();
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, AppError> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() {
            return Ok(None);
        }

        // Unterminated last line
        self.next_index = 0;
        let rest = src.split_to(src.len());
        Ok(Some(to_text(&rest)))
    }
}

impl Encoder<Reply> for LineCodec {
    type Error = AppError;

    fn encode(&mut self, reply: Reply, dst: &mut BytesMut) -> Result<(), AppError> {
        let line = reply.to_string();
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
