//! Room configuration and state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Configuration for room actors.
///
/// Puzzle implementations can override these defaults through
/// `PuzzleLogic::room_config()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Capacity of the room's command mailbox. Callers wait when it is
    /// full.
    pub mailbox_size: usize,

    /// Capacity of each member's outbound buffer. A member whose buffer
    /// fills up is dropped from the room rather than slowing it down.
    pub member_buffer: usize,

    /// How long a room that has no members waits for a join before it
    /// evicts itself.
    pub empty_grace: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            mailbox_size: 64,
            member_buffer: 256,
            empty_grace: Duration::from_secs(30),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// ```text
/// Empty ──first join──→ Active ──last leave──→ (evicted)
/// ```
///
/// - **Empty**: freshly created by the registry; nobody has joined yet.
///   A room that stays Empty past `RoomConfig::empty_grace`, or that
///   handles any command other than `info` while it has no members, is
///   evicted.
/// - **Active**: at least one member.
///
/// There is no way back from Active to Empty within one room instance:
/// when the last member leaves, the room removes itself from the registry
/// and stops. The next join for that id creates a new room at version 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    Empty,
    Active,
}

impl RoomState {
    /// Returns `true` if the room has members.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Active => write!(f, "Active"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_state_is_active() {
        assert!(!RoomState::Empty.is_active());
        assert!(RoomState::Active.is_active());
    }

    #[test]
    fn test_room_state_display() {
        assert_eq!(RoomState::Empty.to_string(), "Empty");
        assert_eq!(RoomState::Active.to_string(), "Active");
    }

    #[test]
    fn test_room_config_default() {
        let config = RoomConfig::default();
        assert_eq!(config.mailbox_size, 64);
        assert_eq!(config.member_buffer, 256);
        assert_eq!(config.empty_grace, Duration::from_secs(30));
    }
}
