//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForPrefix`: Need at least 8 bytes
//! - `WaitingForSegments`: Prefix parsed, need header + body bytes

use bytes::BytesMut;

use super::wire_format::{Prefix, DEFAULT_MAX_PAYLOAD_SIZE, PREFIX_SIZE};
use super::Frame;
use crate::error::Result;

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for complete prefix (need 8 bytes).
    WaitingForPrefix,
    /// Prefix parsed, waiting for both segments.
    WaitingForSegments { prefix: Prefix },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed segment size.
    max_payload_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64KB, max segment: 64MB.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a new frame buffer with custom max segment size.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForPrefix,
            max_payload_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns error if a segment exceeds max_payload_size. The stream cannot
    /// be resynchronized after that.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        match self.state {
            State::WaitingForPrefix => {
                let Some(prefix) = Prefix::decode(&self.buffer) else {
                    return Ok(None);
                };
                prefix.validate(self.max_payload_size)?;

                let _ = self.buffer.split_to(PREFIX_SIZE);
                self.state = State::WaitingForSegments { prefix };

                self.try_extract_one()
            }

            State::WaitingForSegments { prefix } => {
                let header_len = prefix.header_len as usize;
                let body_len = prefix.body_len as usize;

                if self.buffer.len() < header_len + body_len {
                    return Ok(None);
                }

                let header = self.buffer.split_to(header_len).freeze();
                let body = self.buffer.split_to(body_len).freeze();
                self.state = State::WaitingForPrefix;

                Ok(Some(Frame::new(header, body)))
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForPrefix => "WaitingForPrefix",
            State::WaitingForSegments { .. } => "WaitingForSegments",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
