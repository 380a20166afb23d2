//! Protocol module - wire format, framing, and command codes.
//!
//! This module implements the binary framing of the TCP protocol:
//! - 4-byte little-endian length prefix + 18-byte header encoding/decoding
//! - Command code lookup table
//! - Frame buffer for reassembling fragmented or coalesced reads

mod command;
mod frame;
mod frame_buffer;
mod wire_format;

pub use command::TcpCommand;
pub use frame::Frame;
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    auth_flags, decode_length, encode_length, frame_length, validate_length, Header, AUTH_FLAG_OFFSET,
    COMMAND_OFFSET, CORRELATION_ID_OFFSET, CORRELATION_ID_SIZE, DEFAULT_MAX_FRAME_SIZE,
    HEADER_SIZE, LENGTH_PREFIX_SIZE, PAYLOAD_OFFSET,
};
