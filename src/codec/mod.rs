//! Codec module - serialization/deserialization for payloads.
//!
//! Frame payloads are protobuf bodies (see [`crate::messages`]).
//!
//! - [`ProtobufCodec`] - encode/decode of a single body using `prost`
//!
//! # Design
//!
//! Codecs are implemented as marker structs with static methods rather than trait objects.
//! Mapping a command code to the matching response type is done by
//! [`Reply::decode`](crate::Reply::decode).
//!
//! # Example
//!
//! ```
//! use tcpeventstore::codec::ProtobufCodec;
//! use tcpeventstore::messages::SubscribeToStream;
//!
//! let dto = SubscribeToStream { event_stream_id: "test".into(), resolve_link_tos: false };
//! let encoded = ProtobufCodec::encode(&dto);
//! let decoded: SubscribeToStream = ProtobufCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, dto);
//! ```

mod protobuf;

pub use protobuf::ProtobufCodec;
