//! Error types for the room layer.

use std::time::Duration;

use cardroom_protocol::{PlayerId, RoomId};

/// Errors that can occur during room operations.
///
/// None of these indicate a problem with the server itself; they are
/// reported to the one request that hit them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The room is not in the registry.
    #[error("room {0} not found")]
    UnknownRoom(RoomId),

    /// The player is not in this room.
    #[error("player {0} not in room {1}")]
    UnknownPlayer(PlayerId, RoomId),

    /// Nothing arrived in the player's mailbox within the listen timeout.
    #[error("no message for {0} within {1:?}")]
    DeliveryTimeout(PlayerId, Duration),

    /// The player's mailbox was torn down (disconnect or eviction) while
    /// a listen was waiting on it.
    #[error("mailbox of {0} was closed")]
    MailboxClosed(PlayerId),
}
