//! Identity types shared by every layer: roles and room ids.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Longest room id accepted in a handshake, in characters.
pub const MAX_ROOM_ID_LEN: usize = 128;

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// The authority tier a session was issued with.
///
/// The set is closed on purpose: permission checks compare against a
/// declared minimum role instead of branching on names.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Logged in with a display name only.
    Player,
    /// Logged in with the shared DM secret; may do everything a player can.
    DungeonMaster,
}

impl Role {
    /// Returns `true` if a holder of `self` may perform an action whose
    /// minimum role is `required`.
    pub fn satisfies(self, required: Role) -> bool {
        self >= required
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player => write!(f, "player"),
            Self::DungeonMaster => write!(f, "dungeon_master"),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomId
// ---------------------------------------------------------------------------

/// A caller-chosen room identifier.
///
/// There is no room-creation endpoint: joining an id that does not exist
/// yet creates the room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Validates and wraps a room id. Surrounding whitespace is trimmed.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidMessage`] if the id is blank or longer than
    /// [`MAX_ROOM_ID_LEN`] characters.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::InvalidMessage(
                "room id must not be empty".into(),
            ));
        }
        if trimmed.chars().count() > MAX_ROOM_ID_LEN {
            return Err(ProtocolError::InvalidMessage(format!(
                "room id longer than {MAX_ROOM_ID_LEN} characters"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
