//! Decoded replies delivered to response handlers.

use crate::codec::ProtobufCodec;
use crate::error::{EventStoreError, Result};
use crate::messages::{
    ReadStreamEventsCompleted, StreamEventAppeared, SubscriptionConfirmation,
    SubscriptionDropped, WriteEventsCompleted,
};
use crate::protocol::TcpCommand;

/// A server response or push, decoded by command code.
///
/// Protocol rejections arrive as [`Reply::BadRequest`] through the same
/// channel as successful responses, so synchronous and callback call sites
/// handle them the same way.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Result of an append.
    WriteCompleted(WriteEventsCompleted),
    /// Result of a forward or backward read.
    ReadCompleted(ReadStreamEventsCompleted),
    /// The server accepted a subscription.
    SubscriptionConfirmed(SubscriptionConfirmation),
    /// A new event on a subscribed stream.
    EventAppeared(StreamEventAppeared),
    /// The subscription ended (unsubscribe or server side).
    SubscriptionDropped(SubscriptionDropped),
    /// The server rejected the request. Carries the server's message.
    BadRequest(String),
    /// The payload for a known command could not be decoded.
    Malformed { command: TcpCommand, error: String },
    /// The connection was lost or closed before the server ended this exchange.
    Disconnected,
}

impl Reply {
    /// Decode the payload of a response or push command.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for commands that never carry a reply
    /// (requests, heartbeats) and a decode error for invalid bodies.
    pub fn decode(command: TcpCommand, payload: &[u8]) -> Result<Self> {
        let reply = match command {
            TcpCommand::WriteEventsCompleted => {
                Reply::WriteCompleted(ProtobufCodec::decode(payload)?)
            }
            TcpCommand::ReadStreamEventsForwardCompleted
            | TcpCommand::ReadStreamEventsBackwardCompleted => {
                Reply::ReadCompleted(ProtobufCodec::decode(payload)?)
            }
            TcpCommand::SubscriptionConfirmation => {
                Reply::SubscriptionConfirmed(ProtobufCodec::decode(payload)?)
            }
            TcpCommand::StreamEventAppeared => {
                Reply::EventAppeared(ProtobufCodec::decode(payload)?)
            }
            TcpCommand::SubscriptionDropped => {
                Reply::SubscriptionDropped(ProtobufCodec::decode(payload)?)
            }
            TcpCommand::BadRequest => {
                Reply::BadRequest(String::from_utf8_lossy(payload).into_owned())
            }
            other => {
                return Err(EventStoreError::Protocol(format!(
                    "{} does not carry a reply",
                    other
                )))
            }
        };
        Ok(reply)
    }

    /// Check if the server rejected the request.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Reply::BadRequest(_))
    }

    /// Check if this reply ends a subscription.
    pub fn is_subscription_end(&self) -> bool {
        matches!(self, Reply::SubscriptionDropped(_) | Reply::Disconnected)
    }
}
