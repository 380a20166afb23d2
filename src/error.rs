//! Error types for tcpeventstore.

use thiserror::Error;

use crate::handler::CorrelationId;
use crate::transport::Endpoint;

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// I/O error on an established socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket could not be opened.
    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    /// Protocol error (invalid length prefix, truncated header, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Protobuf payload could not be decoded.
    #[error("Protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Protobuf payload could not be encoded.
    #[error("Protobuf encode error: {0}")]
    Encode(#[from] prost::EncodeError),

    /// JSON serialization/deserialization error (event bodies only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A subscription was requested without a handler.
    #[error("Callback required")]
    MissingCallback,

    /// Unsubscribe for a token that has no registered handler.
    #[error("No subscription registered for correlation id {0}")]
    UnknownSubscription(CorrelationId),

    /// The connection was closed by the caller.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Another connect, or the reconnect supervisor, is already opening the socket.
    #[error("Connection attempt already in progress")]
    ConnectInProgress,
}

/// Result type alias using EventStoreError.
pub type Result<T> = std::result::Result<T, EventStoreError>;
