//! Unified error type for Puzzlesync.

use puzzlesync_protocol::ProtocolError;
use puzzlesync_room::RoomError;
use puzzlesync_session::SessionError;
use puzzlesync_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `puzzlesync` crate, you deal with this single error type
/// instead of importing errors from each layer. The `#[from]` attribute on
/// each variant generates the `From` impls that `?` relies on.
#[derive(Debug, thiserror::Error)]
pub enum PuzzleSyncError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (login, validation, randomness).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (not a member, room unavailable).
    #[error(transparent)]
    Room(#[from] RoomError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use puzzlesync_protocol::RoomId;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::Send("broken pipe".into());
        let top: PuzzleSyncError = err.into();
        assert!(matches!(top, PuzzleSyncError::Transport(_)));
        assert!(top.to_string().contains("broken pipe"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let top: PuzzleSyncError = err.into();
        assert!(matches!(top, PuzzleSyncError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let top: PuzzleSyncError = SessionError::Expired.into();
        assert!(matches!(top, PuzzleSyncError::Session(SessionError::Expired)));
        assert_eq!(top.to_string(), "session expired");
    }

    #[test]
    fn test_from_room_error() {
        let err = RoomError::Unavailable(RoomId::parse("tavern").unwrap());
        let top: PuzzleSyncError = err.into();
        assert!(matches!(top, PuzzleSyncError::Room(_)));
        assert!(top.to_string().contains("tavern"));
    }
}
