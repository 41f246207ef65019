//! NDJSON frame decoder for chunked response bodies.
//!
//! Bytes arrive in arbitrary chunks: a line, or a multi-byte character, may
//! be split across any number of them. The decoder keeps two carries between
//! calls:
//!
//! - `pending`: raw trailing bytes of an incomplete UTF-8 sequence
//! - `buffer`: decoded text after the last newline seen so far
//!
//! A line is only parsed once its terminating `\n` has arrived, so the frame
//! sequence is independent of where the chunk boundaries fall.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// One JSON object decoded from a single stream line. Untyped until classified.
pub type Frame = Map<String, Value>;

/// Why a complete line produced no frame. Logged and dropped, never raised.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed JSON line: {0}")]
    Json(#[from] serde_json::Error),
    #[error("line is valid JSON but not an object")]
    NotAnObject,
}

/// What [`FrameDecoder::flush`] does with text left after the last newline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TailPolicy {
    /// An unterminated final line is incomplete and is dropped.
    #[default]
    Discard,
    /// Parse the unterminated final line as if a newline followed it.
    Decode,
}

/// Running counts for one decoded stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub frames: usize,
    pub malformed_lines: usize,
    pub discarded_tail_bytes: usize,
}

/// Incremental NDJSON decoder. One per response body.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    buffer: String,
    tail_policy: TailPolicy,
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tail_policy(tail_policy: TailPolicy) -> Self {
        Self {
            tail_policy,
            ..Self::default()
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Decode one chunk and return every frame whose line is now complete.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        // The carried buffer holds no newline; scan only the appended text.
        let scan_from = self.buffer.len();
        self.decode_utf8(chunk);

        let Some(offset) = self.buffer[scan_from..].rfind('\n') else {
            return Vec::new();
        };
        let tail = self.buffer.split_off(scan_from + offset + 1);
        let complete = std::mem::replace(&mut self.buffer, tail);

        complete
            .split('\n')
            .filter_map(|line| self.parse_line(line))
            .collect()
    }

    /// End of body. Whatever follows the last newline is handled per the
    /// decoder's [`TailPolicy`]; with the default policy this yields nothing.
    pub fn flush(&mut self) -> Vec<Frame> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.buffer.push_str(&String::from_utf8_lossy(&rest));
        }

        let tail = std::mem::take(&mut self.buffer);
        if tail.trim().is_empty() {
            return Vec::new();
        }

        match self.tail_policy {
            TailPolicy::Discard => {
                self.stats.discarded_tail_bytes += tail.len();
                debug!(bytes = tail.len(), "discarding unterminated stream tail");
                Vec::new()
            }
            TailPolicy::Decode => self.parse_line(&tail).into_iter().collect(),
        }
    }

    /// Append `chunk` to the text buffer, holding back an incomplete trailing
    /// sequence. Invalid sequences become U+FFFD.
    fn decode_utf8(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);

        let mut consumed = 0;
        loop {
            let rest = &self.pending[consumed..];
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    consumed = self.pending.len();
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.buffer.push_str(text);
                    }
                    consumed += valid.len();
                    match err.error_len() {
                        Some(bad) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            consumed += bad;
                        }
                        // Incomplete sequence at the end: wait for the next chunk.
                        None => {
                            debug_assert!(after.len() < 4);
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..consumed);
    }

    fn parse_line(&mut self, line: &str) -> Option<Frame> {
        if line.trim().is_empty() {
            return None;
        }
        match decode_line(line) {
            Ok(frame) => {
                self.stats.frames += 1;
                Some(frame)
            }
            Err(err) => {
                self.stats.malformed_lines += 1;
                warn!(error = %err, line_len = line.len(), "skipping malformed stream line");
                None
            }
        }
    }
}

/// Parse one complete line into a frame.
pub fn decode_line(line: &str) -> Result<Frame, DecodeError> {
    match serde_json::from_str::<Value>(line)? {
        Value::Object(frame) => Ok(frame),
        _ => Err(DecodeError::NotAnObject),
    }
}
