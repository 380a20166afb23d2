//! Events to append and the version/position values used by commands.
//!
//! # Example
//!
//! ```
//! use tcpeventstore::{EventData, ExpectedVersion};
//!
//! #[derive(serde::Serialize)]
//! struct Deposited {
//!     amount: u64,
//! }
//!
//! let event = EventData::json("Deposited", &Deposited { amount: 10 })
//!     .unwrap()
//!     .with_metadata(b"{}".to_vec());
//!
//! assert!(event.is_json());
//! assert_eq!(event.data(), br#"{"amount":10}"#);
//! assert_eq!(i64::from(ExpectedVersion::Any), -2);
//! ```

use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::messages::NewEvent;

/// Content type marker for JSON bodies.
const CONTENT_TYPE_JSON: i32 = 1;
/// Content type marker for opaque binary bodies.
const CONTENT_TYPE_BINARY: i32 = 0;

/// An event to append to a stream. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventData {
    id: Uuid,
    event_type: String,
    is_json: bool,
    data: Bytes,
    metadata: Bytes,
}

impl EventData {
    /// Create a binary event with a fresh id and no metadata.
    pub fn new(event_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            is_json: false,
            data: data.into(),
            metadata: Bytes::new(),
        }
    }

    /// Create a JSON event by serializing `body`.
    pub fn json<T: Serialize>(event_type: impl Into<String>, body: &T) -> Result<Self> {
        let data = serde_json::to_vec(body)?;
        Ok(Self {
            is_json: true,
            ..Self::new(event_type, data)
        })
    }

    /// Replace the generated id, e.g. for idempotent retries.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_metadata(mut self, metadata: impl Into<Bytes>) -> Self {
        self.metadata = metadata.into();
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn is_json(&self) -> bool {
        self.is_json
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }
}

impl From<&EventData> for NewEvent {
    /// Metadata is always sent as binary, even for JSON events.
    fn from(event: &EventData) -> Self {
        NewEvent {
            event_id: event.id.as_bytes().to_vec(),
            event_type: event.event_type.clone(),
            data_content_type: if event.is_json {
                CONTENT_TYPE_JSON
            } else {
                CONTENT_TYPE_BINARY
            },
            metadata_content_type: CONTENT_TYPE_BINARY,
            data: event.data.to_vec(),
            metadata: Some(event.metadata.to_vec()),
        }
    }
}

/// Optimistic concurrency check for an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpectedVersion {
    /// Append regardless of the stream's current version (`-2`).
    Any,
    /// The stream must not exist yet (`-1`).
    NoStream,
    /// The stream must exist, at any version (`-4`).
    StreamExists,
    /// The stream's last event number must equal this value.
    Exact(i64),
}

impl ExpectedVersion {
    pub const ANY: i64 = -2;
    pub const NO_STREAM: i64 = -1;
    pub const STREAM_EXISTS: i64 = -4;

    /// Value sent on the wire.
    pub fn as_i64(self) -> i64 {
        match self {
            ExpectedVersion::Any => Self::ANY,
            ExpectedVersion::NoStream => Self::NO_STREAM,
            ExpectedVersion::StreamExists => Self::STREAM_EXISTS,
            ExpectedVersion::Exact(version) => version,
        }
    }
}

impl From<ExpectedVersion> for i64 {
    fn from(version: ExpectedVersion) -> i64 {
        version.as_i64()
    }
}

impl From<i64> for ExpectedVersion {
    fn from(version: i64) -> Self {
        match version {
            ExpectedVersion::ANY => ExpectedVersion::Any,
            ExpectedVersion::NO_STREAM => ExpectedVersion::NoStream,
            ExpectedVersion::STREAM_EXISTS => ExpectedVersion::StreamExists,
            exact => ExpectedVersion::Exact(exact),
        }
    }
}

/// Well-known event numbers to start a read from.
#[derive(Debug, Clone, Copy)]
pub struct StreamPosition;

impl StreamPosition {
    /// First event of a stream.
    pub const START: i64 = 0;
    /// Last event of a stream (backward reads).
    pub const END: i64 = -1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_event_content_types() {
        let binary = NewEvent::from(&EventData::new("Raw", vec![1u8, 2, 3]));
        assert_eq!(binary.data_content_type, 0);
        assert_eq!(binary.metadata_content_type, 0);
        assert_eq!(binary.metadata, Some(Vec::new()));

        let json = NewEvent::from(&EventData::json("Test", &serde_json::json!({})).unwrap());
        assert_eq!(json.data_content_type, 1);
        assert_eq!(json.metadata_content_type, 0);
        assert_eq!(json.data, b"{}");
        assert_eq!(json.event_id.len(), 16);
    }

    #[test]
    fn test_with_id_and_metadata() {
        let id = Uuid::new_v4();
        let event = EventData::new("Test", Bytes::from_static(b"x"))
            .with_id(id)
            .with_metadata(Bytes::from_static(b"meta"));

        let dto = NewEvent::from(&event);
        assert_eq!(dto.event_id, id.as_bytes().to_vec());
        assert_eq!(dto.metadata.as_deref(), Some(&b"meta"[..]));
    }

    #[test]
    fn test_fresh_ids_differ() {
        assert_ne!(
            EventData::new("A", Bytes::new()).id(),
            EventData::new("A", Bytes::new()).id()
        );
    }

    #[test]
    fn test_expected_version_wire_values() {
        assert_eq!(ExpectedVersion::Any.as_i64(), -2);
        assert_eq!(ExpectedVersion::NoStream.as_i64(), -1);
        assert_eq!(ExpectedVersion::StreamExists.as_i64(), -4);
        assert_eq!(ExpectedVersion::Exact(7).as_i64(), 7);

        assert_eq!(ExpectedVersion::from(-2), ExpectedVersion::Any);
        assert_eq!(ExpectedVersion::from(0), ExpectedVersion::Exact(0));
    }
}
