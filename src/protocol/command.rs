//! Command codes carried in the first header byte.
//!
//! The byte values are fixed by the server and must not be renumbered.

use std::fmt;

/// Commands understood by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TcpCommand {
    HeartbeatRequest = 0x01,
    HeartbeatResponse = 0x02,

    WriteEvents = 0x82,
    WriteEventsCompleted = 0x83,

    ReadStreamEventsForward = 0xB2,
    ReadStreamEventsForwardCompleted = 0xB3,
    ReadStreamEventsBackward = 0xB4,
    ReadStreamEventsBackwardCompleted = 0xB5,

    SubscribeToStream = 0xC0,
    SubscriptionConfirmation = 0xC1,
    StreamEventAppeared = 0xC2,
    UnsubscribeFromStream = 0xC3,
    SubscriptionDropped = 0xC4,

    BadRequest = 0xF0,
}

impl TcpCommand {
    /// Look up a command by its wire byte.
    ///
    /// Returns `None` for codes this client does not support.
    pub fn from_u8(code: u8) -> Option<Self> {
        use TcpCommand::*;
        let command = match code {
            0x01 => HeartbeatRequest,
            0x02 => HeartbeatResponse,
            0x82 => WriteEvents,
            0x83 => WriteEventsCompleted,
            0xB2 => ReadStreamEventsForward,
            0xB3 => ReadStreamEventsForwardCompleted,
            0xB4 => ReadStreamEventsBackward,
            0xB5 => ReadStreamEventsBackwardCompleted,
            0xC0 => SubscribeToStream,
            0xC1 => SubscriptionConfirmation,
            0xC2 => StreamEventAppeared,
            0xC3 => UnsubscribeFromStream,
            0xC4 => SubscriptionDropped,
            0xF0 => BadRequest,
            _ => return None,
        };
        Some(command)
    }

    /// Wire byte for this command.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Responses after which the correlation entry is removed.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TcpCommand::WriteEventsCompleted
                | TcpCommand::ReadStreamEventsForwardCompleted
                | TcpCommand::ReadStreamEventsBackwardCompleted
                | TcpCommand::SubscriptionDropped
                | TcpCommand::BadRequest
        )
    }

    /// Server pushes that keep the subscription entry alive.
    #[inline]
    pub fn is_push(self) -> bool {
        matches!(
            self,
            TcpCommand::SubscriptionConfirmation | TcpCommand::StreamEventAppeared
        )
    }

    /// Frames the client dispatches to a registered handler.
    #[inline]
    pub fn is_dispatchable(self) -> bool {
        self.is_terminal() || self.is_push()
    }
}

impl fmt::Display for TcpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:02X})", self, self.as_u8())
    }
}

impl From<TcpCommand> for u8 {
    fn from(command: TcpCommand) -> u8 {
        command.as_u8()
    }
}
