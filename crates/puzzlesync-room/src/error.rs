//! Error types for the room layer.

use puzzlesync_protocol::RoomId;
use puzzlesync_transport::ConnectionId;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The connection is not (or no longer) a member of this room.
    #[error("{0} is not a member of room {1}")]
    NotMember(ConnectionId, RoomId),

    /// The connection already joined this room.
    #[error("{0} already joined room {1}")]
    AlreadyJoined(ConnectionId, RoomId),

    /// The room actor has stopped (it was evicted). Look the room up
    /// again to get a fresh one.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}
