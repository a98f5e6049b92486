//! Rooms for Puzzlesync.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns one
//! puzzle document, its version counter, and its member list.
//!
//! # Key types
//!
//! - [`PuzzleLogic`]: the trait a puzzle implements
//! - [`RoomRegistry`]: finds or creates the room for an id
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`RoomOutbound`]: what a room pushes to each member
//! - [`RoomState`]: lifecycle state
//! - [`RoomConfig`]: mailbox and buffer sizes

mod config;
mod error;
mod logic;
mod registry;
mod room;

pub use config::{RoomConfig, RoomState};
pub use error::RoomError;
pub use logic::PuzzleLogic;
pub use registry::RoomRegistry;
pub use room::{
    member_channel, ApplyOutcome, Member, MemberReceiver, MemberSender, Rejection,
    RejectionKind, RoomHandle, RoomInfo, RoomOutbound,
};
