//! Wire protocol for Puzzlesync.
//!
//! This crate defines what travels between clients and the server:
//!
//! - **Identity** ([`Role`], [`RoomId`]): shared by the session and room
//!   layers.
//! - **Real-time messages** ([`ClientMessage`], [`ServerMessage`],
//!   [`ErrorReason`]): the room channel.
//! - **Auth messages** ([`AuthRequest`], [`AuthResponse`]): login, logout,
//!   and session lookup.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become bytes.
//!
//! ```text
//! Transport (bytes) → Protocol (messages) → Session / Room
//! ```

mod auth;
mod codec;
mod error;
mod message;
mod types;

pub use auth::{AuthRequest, AuthResponse, SessionGrant};
pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{close_code, ClientMessage, ErrorReason, ServerMessage};
pub use types::{Role, RoomId, MAX_ROOM_ID_LEN};
