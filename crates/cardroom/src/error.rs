//! Unified error type for Cardroom.

use cardroom_protocol::ProtocolError;
use cardroom_room::RoomError;

use crate::handler::HandlerError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls,
/// so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum CardroomError {
    /// Encoding or decoding failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room-level error (unknown room or player, timeout).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// A request was rejected at the handler boundary.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// Binding or serving the listener failed.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardroom_protocol::RoomId;

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let cardroom_err: CardroomError = err.into();
        assert!(matches!(cardroom_err, CardroomError::Protocol(_)));
        assert!(cardroom_err.to_string().contains("bad"));
    }

    #[test]
    fn test_from_room_error() {
        let err = RoomError::UnknownRoom(RoomId::from("g1"));
        let cardroom_err: CardroomError = err.into();
        assert!(matches!(cardroom_err, CardroomError::Room(_)));
        assert_eq!(cardroom_err.to_string(), "room g1 not found");
    }

    #[test]
    fn test_from_handler_error() {
        let err = HandlerError::MissingParameter("gameID");
        let cardroom_err: CardroomError = err.into();
        assert!(matches!(cardroom_err, CardroomError::Handler(_)));
    }

    #[test]
    fn test_from_io_error() {
        let err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "taken");
        let cardroom_err: CardroomError = err.into();
        assert!(matches!(cardroom_err, CardroomError::Io(_)));
    }
}
