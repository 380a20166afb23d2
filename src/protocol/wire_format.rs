//! Wire format encoding and decoding.
//!
//! Every frame on the socket is a little-endian length prefix followed by an
//! 18-byte header and the payload:
//! ```text
//! ┌──────────┬─────────┬───────────┬────────────────┬─────────┐
//! │ Length   │ Command │ Auth flag │ Correlation id │ Payload │
//! │ 4 bytes  │ 1 byte  │ 1 byte    │ 16 bytes       │ N bytes │
//! │ uint32 LE│         │           │ raw            │         │
//! └──────────┴─────────┴───────────┴────────────────┴─────────┘
//! ```
//!
//! The length covers everything after itself, i.e. `HEADER_SIZE + N`.

use crate::error::{EventStoreError, Result};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Header size in bytes (fixed, exactly 18).
pub const HEADER_SIZE: usize = 18;

/// Offset of the command byte within the header.
pub const COMMAND_OFFSET: usize = 0;

/// Offset of the auth flag byte within the header.
pub const AUTH_FLAG_OFFSET: usize = 1;

/// Offset of the correlation id within the header.
pub const CORRELATION_ID_OFFSET: usize = 2;

/// Size of the correlation id in bytes.
pub const CORRELATION_ID_SIZE: usize = 16;

/// Offset of the payload within the header-relative frame body.
pub const PAYLOAD_OFFSET: usize = 18;

/// Default maximum frame body size accepted from the server (64 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Auth flag values.
pub mod auth_flags {
    /// No credentials follow the header.
    pub const NONE: u8 = 0x00;
    /// Credentials follow the header (reserved, never sent by this client).
    pub const AUTHENTICATED: u8 = 0x01;
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Raw command byte.
    pub command: u8,
    /// Auth flag byte (see `auth_flags`).
    pub auth_flag: u8,
    /// Correlation id bytes.
    pub correlation_id: [u8; CORRELATION_ID_SIZE],
}

impl Header {
    /// Create a new header.
    pub fn new(command: u8, auth_flag: u8, correlation_id: [u8; CORRELATION_ID_SIZE]) -> Self {
        Self {
            command,
            auth_flag,
            correlation_id,
        }
    }

    /// Encode header to bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use tcpeventstore::protocol::{Header, HEADER_SIZE};
    ///
    /// let header = Header::new(0x01, 0, [7u8; 16]);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), HEADER_SIZE);
    /// assert_eq!(bytes[0], 0x01);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (18 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[COMMAND_OFFSET] = self.command;
        buf[AUTH_FLAG_OFFSET] = self.auth_flag;
        buf[CORRELATION_ID_OFFSET..PAYLOAD_OFFSET].copy_from_slice(&self.correlation_id);
    }

    /// Decode header from bytes.
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        let mut correlation_id = [0u8; CORRELATION_ID_SIZE];
        correlation_id.copy_from_slice(&buf[CORRELATION_ID_OFFSET..PAYLOAD_OFFSET]);
        Some(Self {
            command: buf[COMMAND_OFFSET],
            auth_flag: buf[AUTH_FLAG_OFFSET],
            correlation_id,
        })
    }

    /// Check if the auth flag announces credentials.
    #[inline]
    pub fn is_authenticated(&self) -> bool {
        self.auth_flag & auth_flags::AUTHENTICATED != 0
    }
}

/// Encode a length prefix for a frame body of `body_len` bytes.
#[inline]
pub fn encode_length(body_len: u32) -> [u8; LENGTH_PREFIX_SIZE] {
    body_len.to_le_bytes()
}

/// Length prefix for a frame body of `body_len` bytes.
///
/// # Errors
///
/// Returns a protocol error if the body does not fit the 32-bit prefix.
pub fn frame_length(body_len: usize) -> Result<u32> {
    u32::try_from(body_len).map_err(|_| {
        EventStoreError::Protocol(format!(
            "Frame of {} bytes does not fit the 32-bit length prefix",
            body_len
        ))
    })
}

/// Decode a length prefix.
///
/// Returns `None` if fewer than 4 bytes are available.
#[inline]
pub fn decode_length(buf: &[u8]) -> Option<u32> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return None;
    }
    Some(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

/// Validate a length prefix read from the socket.
///
/// The body must at least hold a header and must not exceed `max_frame_size`.
pub fn validate_length(body_len: u32, max_frame_size: u32) -> Result<()> {
    if (body_len as usize) < HEADER_SIZE {
        return Err(EventStoreError::Protocol(format!(
            "Frame length {} is shorter than the {}-byte header",
            body_len, HEADER_SIZE
        )));
    }

    if body_len > max_frame_size {
        return Err(EventStoreError::Protocol(format!(
            "Frame length {} exceeds maximum {}",
            body_len, max_frame_size
        )));
    }

    Ok(())
}
