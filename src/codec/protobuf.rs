//! Protobuf codec using `prost`.

use bytes::Bytes;
use prost::Message;

use crate::error::Result;

/// Protobuf codec for request and response bodies.
pub struct ProtobufCodec;

impl ProtobufCodec {
    /// Encode a message to protobuf bytes.
    #[inline]
    pub fn encode<M: Message>(message: &M) -> Bytes {
        Bytes::from(message.encode_to_vec())
    }

    /// Decode protobuf bytes to a message.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a valid encoding of `M`.
    #[inline]
    pub fn decode<M: Message + Default>(bytes: &[u8]) -> Result<M> {
        Ok(M::decode(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{
        EventRecord, ReadStreamEventsCompleted, ReadStreamResult,
        ResolvedIndexedEvent, WriteEvents, WriteEventsCompleted,
    };

    #[test]
    fn test_encode_decode_request() {
        let dto = WriteEvents {
            event_stream_id: "orders".to_string(),
            expected_version: -2,
            events: vec![],
            require_master: false,
        };

        let decoded: WriteEvents = ProtobufCodec::decode(&ProtobufCodec::encode(&dto)).unwrap();
        assert_eq!(decoded, dto);
    }

    #[test]
    fn test_decode_nested_response() {
        let record = EventRecord {
            event_stream_id: "orders".to_string(),
            event_number: 7,
            event_id: vec![1; 16],
            event_type: "OrderPlaced".to_string(),
            data_content_type: 0,
            metadata_content_type: 0,
            data: b"raw".to_vec(),
            metadata: Some(Vec::new()),
            created: Some(1),
            created_epoch: None,
        };
        let dto = ReadStreamEventsCompleted {
            events: vec![ResolvedIndexedEvent {
                event: Some(record),
                link: None,
            }],
            result: ReadStreamResult::Success as i32,
            next_event_number: 8,
            last_event_number: 7,
            is_end_of_stream: true,
            last_commit_position: 100,
            error: None,
        };

        let decoded: ReadStreamEventsCompleted =
            ProtobufCodec::decode(&ProtobufCodec::encode(&dto)).unwrap();
        assert_eq!(decoded, dto);
        assert_eq!(decoded.read_result(), Some(ReadStreamResult::Success));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result: Result<WriteEventsCompleted> = ProtobufCodec::decode(&[0xFF, 0xFF, 0xFF]);
        assert!(result.is_err());
    }
}
