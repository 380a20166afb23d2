//! Frame struct with typed accessors.
//!
//! Represents one complete package on the wire: header plus payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use tcpeventstore::protocol::{Frame, TcpCommand};
//! use tcpeventstore::CorrelationId;
//! use bytes::Bytes;
//!
//! let id = CorrelationId::new();
//! let frame = Frame::new(TcpCommand::WriteEvents, id, Bytes::from_static(b"body"));
//!
//! let wire = frame.encode().unwrap();
//! assert_eq!(wire.len(), 4 + 18 + 4);
//!
//! let decoded = Frame::decode(&wire[4..]).unwrap();
//! assert_eq!(decoded, frame);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::command::TcpCommand;
use super::wire_format::{
    auth_flags, encode_length, frame_length, Header, HEADER_SIZE, LENGTH_PREFIX_SIZE,
    PAYLOAD_OFFSET,
};
use crate::error::Result;
use crate::handler::CorrelationId;

/// A complete protocol frame. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: Header,
    /// Kept in memory only; the auth flag is never set on the wire.
    username: Option<String>,
    password: Option<String>,
    payload: Bytes,
}

impl Frame {
    /// Create a frame for a known command with no credentials.
    pub fn new(command: TcpCommand, correlation_id: CorrelationId, payload: Bytes) -> Self {
        Self::from_parts(
            Header::new(command.as_u8(), auth_flags::NONE, correlation_id.into_bytes()),
            payload,
        )
    }

    /// Create a frame from an already decoded header.
    pub fn from_parts(header: Header, payload: Bytes) -> Self {
        Self {
            header,
            username: None,
            password: None,
            payload,
        }
    }

    /// Heartbeat answer echoing the request's correlation id.
    pub fn heartbeat_response(correlation_id: CorrelationId) -> Self {
        Self::new(TcpCommand::HeartbeatResponse, correlation_id, Bytes::new())
    }

    /// Attach credentials to the in-memory representation.
    ///
    /// Credentials are not serialized by [`Frame::encode`].
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Decode a frame body (everything after the length prefix).
    ///
    /// Returns `None` if fewer than `HEADER_SIZE` bytes are available.
    pub fn decode(body: &[u8]) -> Option<Self> {
        let header = Header::decode(body)?;
        Some(Self::from_parts(
            header,
            Bytes::copy_from_slice(&body[PAYLOAD_OFFSET..]),
        ))
    }

    /// Decode a frame body without copying the payload.
    pub fn decode_bytes(mut body: Bytes) -> Option<Self> {
        let header = Header::decode(&body)?;
        let payload = body.split_off(PAYLOAD_OFFSET);
        Some(Self::from_parts(header, payload))
    }

    /// Read the header of an encoded frame (length prefix included)
    /// without touching the payload.
    pub fn peek_header(wire: &[u8]) -> Option<Header> {
        Header::decode(wire.get(LENGTH_PREFIX_SIZE..)?)
    }

    /// Encode the frame including its little-endian length prefix.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Protocol`](crate::EventStoreError::Protocol)
    /// if header plus payload exceed `u32::MAX` bytes.
    pub fn encode(&self) -> Result<Bytes> {
        let length = frame_length(self.size())?;
        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + self.size());
        buf.put_slice(&encode_length(length));
        buf.put_slice(&self.header.encode());
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Value of the length prefix: header plus payload.
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Get the decoded header.
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Get the command, if it is one this client supports.
    #[inline]
    pub fn command(&self) -> Option<TcpCommand> {
        TcpCommand::from_u8(self.header.command)
    }

    /// Get the raw command byte.
    #[inline]
    pub fn command_byte(&self) -> u8 {
        self.header.command
    }

    /// Get the auth flag byte.
    #[inline]
    pub fn auth_flag(&self) -> u8 {
        self.header.auth_flag
    }

    /// Get the correlation id.
    #[inline]
    pub fn correlation_id(&self) -> CorrelationId {
        CorrelationId::from_bytes(self.header.correlation_id)
    }

    /// Get the username kept alongside this frame.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Get the password kept alongside this frame.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get a clone of the payload as Bytes (cheap, zero-copy).
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }
}
