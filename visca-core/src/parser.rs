//! Streaming frame parser with bounded resynchronization

use bytes::{Buf, BytesMut};
use tracing::{trace, warn};

use crate::{
    constants::{MAX_FRAME_LEN, TERMINATOR},
    error::HexBytes,
    frame::Frame,
};

/// Splits a byte stream into frames
///
/// Bytes are buffered until a terminator arrives. The frame starts at the
/// last byte before the terminator with bit 7 set; anything in front of it
/// is dropped. Without a terminator, the buffer never holds more than
/// `max_len - 1` bytes between calls, so line noise cannot grow it.
///
/// # Examples
///
/// ```
/// use visca_core::FrameParser;
///
/// let mut parser = FrameParser::new();
/// let frames = parser.feed(&[0x12, 0x34, 0x90, 0x41, 0xFF, 0x90]);
/// assert_eq!(frames.len(), 1);
/// assert_eq!(parser.discarded(), 2);
/// assert_eq!(parser.buffered(), 1);
/// ```
#[derive(Debug)]
pub struct FrameParser {
    buf: BytesMut,
    max_len: usize,
    discarding: bool,
    discarded: usize,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub fn new() -> Self {
        Self::with_max_len(MAX_FRAME_LEN)
    }

    /// Parser with a custom frame bound (at least 3)
    pub fn with_max_len(max_len: usize) -> Self {
        let max_len = max_len.max(3);
        Self {
            buf: BytesMut::with_capacity(max_len * 2),
            max_len,
            discarding: false,
            discarded: 0,
        }
    }

    /// Append received bytes
    pub fn push(&mut self, data: &[u8]) {
        trace!(bytes = %HexBytes(data), "rx");
        self.buf.extend_from_slice(data);
    }

    /// Append received bytes and take every complete frame
    pub fn feed(&mut self, data: &[u8]) -> Vec<Frame> {
        self.push(data);
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    /// Take the next complete frame, if any
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let Some(end) = self.buf.iter().position(|b| *b == TERMINATOR) else {
                self.trim();
                return None;
            };

            let segment = self.buf.split_to(end + 1);
            let resyncing = std::mem::take(&mut self.discarding);

            let start = segment[..end].iter().rposition(|b| b & 0x80 != 0);
            match start {
                Some(start) if end - start >= 2 && segment.len() - start <= self.max_len => {
                    if start > 0 || resyncing {
                        self.discarded += start;
                        warn!(
                            dropped = start,
                            total = self.discarded,
                            "resynchronized on frame boundary"
                        );
                    }
                    match Frame::decode(&segment[start..]) {
                        Ok(frame) => return Some(frame),
                        Err(e) => {
                            self.discarded += segment.len() - start;
                            warn!(error = %e, "dropping undecodable frame");
                        }
                    }
                }
                _ => {
                    self.discarded += segment.len();
                    warn!(
                        bytes = %HexBytes(&segment),
                        total = self.discarded,
                        "dropping malformed segment"
                    );
                }
            }
        }
    }

    fn trim(&mut self) {
        if self.buf.len() < self.max_len {
            return;
        }
        let excess = self.buf.len() - (self.max_len - 1);
        self.buf.advance(excess);
        self.discarded += excess;
        if !self.discarding {
            warn!(dropped = excess, "no terminator within frame bound, discarding");
        }
        self.discarding = true;
    }

    /// Total bytes dropped while resynchronizing
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Bytes waiting for a terminator
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Whether the parser is skipping an overlong run
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    /// Forget any partial frame, e.g. after the link was reopened
    pub fn clear(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }
}
