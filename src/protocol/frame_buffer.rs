//! Frame buffer for reassembling frames from raw socket reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented and coalesced reads:
//! - `WaitingForLength`: Need at least 4 bytes of length prefix
//! - `WaitingForBody`: Length parsed, need N more body bytes
//!
//! A single read may carry several frames and end in the middle of the next
//! one; leftover bytes are kept for the following `push`.
//!
//! # Example
//!
//! ```
//! use tcpeventstore::protocol::{Frame, FrameBuffer, TcpCommand};
//! use tcpeventstore::CorrelationId;
//! use bytes::Bytes;
//!
//! let wire = Frame::new(TcpCommand::HeartbeatRequest, CorrelationId::new(), Bytes::new()).encode().unwrap();
//!
//! let mut buffer = FrameBuffer::new();
//! assert!(buffer.push(&wire[..7]).unwrap().is_empty());
//! let frames = buffer.push(&wire[7..]).unwrap();
//! assert_eq!(frames.len(), 1);
//! ```

use bytes::BytesMut;

use super::wire_format::{
    decode_length, validate_length, DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE,
};
use super::Frame;
use crate::error::{EventStoreError, Result};

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for the 4-byte length prefix.
    WaitingForLength,
    /// Length parsed, waiting for `length` body bytes.
    WaitingForBody { length: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Leftover bytes from previous reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum accepted value of a length prefix.
    max_frame_size: u32,
    /// Error hit after frames were already extracted from the same push.
    error: Option<EventStoreError>,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64KB, max frame: 64MB.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new frame buffer with a custom max frame size.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForLength,
            max_frame_size,
            error: None,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Returns the complete frames in wire order (may be empty if still
    /// waiting for data). Partial data is kept for the next push.
    ///
    /// If a bad length prefix follows frames that were already extracted,
    /// those frames are still returned and the error is kept for
    /// [`FrameBuffer::take_error`].
    ///
    /// # Errors
    ///
    /// Returns error if a length prefix is shorter than a header or larger
    /// than the configured maximum and no frame precedes it. The buffer
    /// should be discarded afterwards.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        loop {
            match self.try_extract_one() {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(e) if frames.is_empty() => return Err(e),
                Err(e) => {
                    self.error = Some(e);
                    break;
                }
            }
        }

        Ok(frames)
    }

    /// Take the error that cut the last [`FrameBuffer::push`] short.
    ///
    /// Check this after handling the frames `push` returned.
    pub fn take_error(&mut self) -> Option<EventStoreError> {
        self.error.take()
    }

    /// Try to extract a single frame from the buffer.
    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.state {
                State::WaitingForLength => {
                    let Some(length) = decode_length(&self.buffer) else {
                        return Ok(None);
                    };
                    validate_length(length, self.max_frame_size)?;

                    let _ = self.buffer.split_to(LENGTH_PREFIX_SIZE);
                    self.state = State::WaitingForBody {
                        length: length as usize,
                    };
                }

                State::WaitingForBody { length } => {
                    if self.buffer.len() < length {
                        return Ok(None);
                    }

                    let body = self.buffer.split_to(length).freeze();
                    self.state = State::WaitingForLength;

                    // validate_length guarantees a full header
                    return Frame::decode_bytes(body).map(Some).ok_or_else(|| {
                        EventStoreError::Protocol("Truncated frame header".to_string())
                    });
                }
            }
        }
    }

    /// Get the number of buffered bytes (excluding a consumed length prefix).
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer holds no partial frame.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && matches!(self.state, State::WaitingForLength)
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForLength;
        self.error = None;
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForLength => "WaitingForLength",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
