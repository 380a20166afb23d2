//! Protobuf bodies carried in frame payloads.
//!
//! These mirror the server's client message definitions (proto2). Fields the
//! server declares `required` are tagged `required` so they are always
//! emitted, even when they hold a default value.

use prost::{Enumeration, Message};
use serde::de::DeserializeOwned;

use crate::error::Result;

/// An event to be written.
#[derive(Clone, PartialEq, Message)]
pub struct NewEvent {
    #[prost(bytes = "vec", required, tag = "1")]
    pub event_id: Vec<u8>,
    #[prost(string, required, tag = "2")]
    pub event_type: String,
    #[prost(int32, required, tag = "3")]
    pub data_content_type: i32,
    #[prost(int32, required, tag = "4")]
    pub metadata_content_type: i32,
    #[prost(bytes = "vec", required, tag = "5")]
    pub data: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub metadata: Option<Vec<u8>>,
}

/// A stored event as returned by reads and subscriptions.
#[derive(Clone, PartialEq, Message)]
pub struct EventRecord {
    #[prost(string, required, tag = "1")]
    pub event_stream_id: String,
    #[prost(int64, required, tag = "2")]
    pub event_number: i64,
    #[prost(bytes = "vec", required, tag = "3")]
    pub event_id: Vec<u8>,
    #[prost(string, required, tag = "4")]
    pub event_type: String,
    #[prost(int32, required, tag = "5")]
    pub data_content_type: i32,
    #[prost(int32, required, tag = "6")]
    pub metadata_content_type: i32,
    #[prost(bytes = "vec", required, tag = "7")]
    pub data: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "8")]
    pub metadata: Option<Vec<u8>>,
    #[prost(int64, optional, tag = "9")]
    pub created: Option<i64>,
    #[prost(int64, optional, tag = "10")]
    pub created_epoch: Option<i64>,
}

impl EventRecord {
    /// Whether the data was written as JSON.
    pub fn is_json(&self) -> bool {
        self.data_content_type == 1
    }

    /// Deserialize the event data as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.data)?)
    }
}

/// An event read from a stream, with the link that pointed to it if any.
#[derive(Clone, PartialEq, Message)]
pub struct ResolvedIndexedEvent {
    #[prost(message, optional, tag = "1")]
    pub event: Option<EventRecord>,
    #[prost(message, optional, tag = "2")]
    pub link: Option<EventRecord>,
}

/// An event pushed to a subscription, with its log position.
#[derive(Clone, PartialEq, Message)]
pub struct ResolvedEvent {
    #[prost(message, optional, tag = "1")]
    pub event: Option<EventRecord>,
    #[prost(message, optional, tag = "2")]
    pub link: Option<EventRecord>,
    #[prost(int64, required, tag = "3")]
    pub commit_position: i64,
    #[prost(int64, required, tag = "4")]
    pub prepare_position: i64,
}

/// Outcome of a write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum OperationResult {
    Success = 0,
    PrepareTimeout = 1,
    CommitTimeout = 2,
    ForwardTimeout = 3,
    WrongExpectedVersion = 4,
    StreamDeleted = 5,
    InvalidTransaction = 6,
    AccessDenied = 7,
}

/// WRITE_EVENTS request body.
#[derive(Clone, PartialEq, Message)]
pub struct WriteEvents {
    #[prost(string, required, tag = "1")]
    pub event_stream_id: String,
    #[prost(int64, required, tag = "2")]
    pub expected_version: i64,
    #[prost(message, repeated, tag = "3")]
    pub events: Vec<NewEvent>,
    #[prost(bool, required, tag = "4")]
    pub require_master: bool,
}

/// WRITE_EVENTS_COMPLETED response body.
#[derive(Clone, PartialEq, Message)]
pub struct WriteEventsCompleted {
    #[prost(enumeration = "OperationResult", required, tag = "1")]
    pub result: i32,
    #[prost(string, optional, tag = "2")]
    pub message: Option<String>,
    #[prost(int64, required, tag = "3")]
    pub first_event_number: i64,
    #[prost(int64, required, tag = "4")]
    pub last_event_number: i64,
    #[prost(int64, optional, tag = "5")]
    pub prepare_position: Option<i64>,
    #[prost(int64, optional, tag = "6")]
    pub commit_position: Option<i64>,
}

impl WriteEventsCompleted {
    /// Decoded operation result; unknown values map to `None`.
    pub fn operation_result(&self) -> Option<OperationResult> {
        OperationResult::try_from(self.result).ok()
    }

    /// Whether the write succeeded.
    pub fn is_success(&self) -> bool {
        self.operation_result() == Some(OperationResult::Success)
    }
}

/// READ_STREAM_EVENTS_FORWARD / BACKWARD request body.
#[derive(Clone, PartialEq, Message)]
pub struct ReadStreamEvents {
    #[prost(string, required, tag = "1")]
    pub event_stream_id: String,
    #[prost(int64, required, tag = "2")]
    pub from_event_number: i64,
    #[prost(int32, required, tag = "3")]
    pub max_count: i32,
    #[prost(bool, required, tag = "4")]
    pub resolve_link_tos: bool,
    #[prost(bool, required, tag = "5")]
    pub require_master: bool,
}

/// Outcome of a stream read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum ReadStreamResult {
    Success = 0,
    NoStream = 1,
    StreamDeleted = 2,
    NotModified = 3,
    Error = 4,
    AccessDenied = 5,
}

/// READ_STREAM_EVENTS_*_COMPLETED response body.
#[derive(Clone, PartialEq, Message)]
pub struct ReadStreamEventsCompleted {
    #[prost(message, repeated, tag = "1")]
    pub events: Vec<ResolvedIndexedEvent>,
    #[prost(enumeration = "ReadStreamResult", required, tag = "2")]
    pub result: i32,
    #[prost(int64, required, tag = "3")]
    pub next_event_number: i64,
    #[prost(int64, required, tag = "4")]
    pub last_event_number: i64,
    #[prost(bool, required, tag = "5")]
    pub is_end_of_stream: bool,
    #[prost(int64, required, tag = "6")]
    pub last_commit_position: i64,
    #[prost(string, optional, tag = "7")]
    pub error: Option<String>,
}

impl ReadStreamEventsCompleted {
    /// Decoded read result; unknown values map to `None`.
    pub fn read_result(&self) -> Option<ReadStreamResult> {
        ReadStreamResult::try_from(self.result).ok()
    }
}

/// SUBSCRIBE_TO_STREAM request body.
#[derive(Clone, PartialEq, Message)]
pub struct SubscribeToStream {
    #[prost(string, required, tag = "1")]
    pub event_stream_id: String,
    #[prost(bool, required, tag = "2")]
    pub resolve_link_tos: bool,
}

/// SUBSCRIPTION_CONFIRMATION push body.
#[derive(Clone, PartialEq, Message)]
pub struct SubscriptionConfirmation {
    #[prost(int64, required, tag = "1")]
    pub last_commit_position: i64,
    #[prost(int64, optional, tag = "2")]
    pub last_event_number: Option<i64>,
}

/// STREAM_EVENT_APPEARED push body.
#[derive(Clone, PartialEq, Message)]
pub struct StreamEventAppeared {
    #[prost(message, optional, tag = "1")]
    pub event: Option<ResolvedEvent>,
}

/// UNSUBSCRIBE_FROM_STREAM request body (empty).
#[derive(Clone, PartialEq, Message)]
pub struct UnsubscribeFromStream {}

/// Why a subscription ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum SubscriptionDropReason {
    Unsubscribed = 0,
    AccessDenied = 1,
    NotFound = 2,
    PersistentSubscriptionDeleted = 3,
    SubscriberMaxCountReached = 4,
}

/// SUBSCRIPTION_DROPPED body.
#[derive(Clone, PartialEq, Message)]
pub struct SubscriptionDropped {
    #[prost(enumeration = "SubscriptionDropReason", optional, tag = "1")]
    pub reason: Option<i32>,
}

impl SubscriptionDropped {
    /// Drop reason, defaulting to `Unsubscribed` when absent or unknown.
    pub fn drop_reason(&self) -> SubscriptionDropReason {
        self.reason
            .and_then(|r| SubscriptionDropReason::try_from(r).ok())
            .unwrap_or(SubscriptionDropReason::Unsubscribed)
    }
}
