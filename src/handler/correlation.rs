//! Correlation ids linking requests to their responses.
//!
//! A correlation id is 16 raw bytes on the wire. Fresh ids are random
//! (UUID v4). Subscriptions hand theirs back to the caller as the handle
//! used to unsubscribe.

use std::fmt;

use uuid::Uuid;

use crate::protocol::CORRELATION_ID_SIZE;

/// A 16-byte correlation token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId([u8; CORRELATION_ID_SIZE]);

impl CorrelationId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    /// Wrap raw bytes received from the wire.
    #[inline]
    pub const fn from_bytes(bytes: [u8; CORRELATION_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; CORRELATION_ID_SIZE] {
        &self.0
    }

    /// Consume into the raw bytes.
    #[inline]
    pub fn into_bytes(self) -> [u8; CORRELATION_ID_SIZE] {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.into_bytes())
    }
}

impl From<CorrelationId> for Uuid {
    fn from(id: CorrelationId) -> Self {
        Uuid::from_bytes(id.0)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Uuid::from_bytes(self.0), f)
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationId({})", self)
    }
}
