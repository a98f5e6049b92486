//! Real-time channel messages.
//!
//! Both directions use internally tagged JSON (`{"type": "...", ...}`),
//! which is the easiest shape to switch on from JavaScript.
//!
//! ```text
//! client → server   {"type":"operation","payload":...}
//!                   {"type":"state_request"} | {"type":"ping"} | {"type":"logout"}
//! server → client   {"type":"snapshot","document":...,"version":3}
//!                   {"type":"update","document":...,"version":4}
//!                   {"type":"error","reason":"forbidden","message":"..."}
//!                   {"type":"pong"}
//! ```

use serde::{Deserialize, Serialize};

/// Close codes the server uses when it ends a real-time connection.
pub mod close_code {
    /// The client asked to log out (or another connection of the same
    /// session did).
    pub const LOGGED_OUT: u16 = 4000;
    /// The handshake was missing a room id or otherwise malformed.
    pub const INVALID_HANDSHAKE: u16 = 4400;
    /// The session token was unknown or expired.
    pub const AUTH_FAILED: u16 = 4401;
    /// The connection was idle too long or could not keep up with
    /// broadcasts.
    pub const TIMEOUT: u16 = 4408;
    /// The room kept shutting down underneath the join; try again.
    pub const UNAVAILABLE: u16 = 4503;
}

/// Why a request was refused. Sent to the requesting client only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    /// Malformed login request or handshake (e.g. blank name or room).
    InvalidInput,
    /// Wrong DM secret.
    Unauthorized,
    /// Unknown or revoked session token.
    NotFound,
    /// Session token past its expiry.
    Expired,
    /// The session's role may not perform this operation.
    Forbidden,
    /// The puzzle layer refused the operation itself.
    InvalidOperation,
    /// The frame could not be decoded.
    InvalidMessage,
    /// The client fell too far behind the room's broadcasts.
    Lagged,
    /// The room is shutting down; reconnect.
    Unavailable,
}

/// Messages a client sends over the real-time channel.
///
/// `O` is the puzzle layer's operation type; the framework only routes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage<O> {
    /// Ask the room to apply a puzzle operation.
    Operation { payload: O },
    /// Ask for a fresh snapshot of the room.
    StateRequest,
    /// Keep-alive; answered with [`ServerMessage::Pong`].
    Ping,
    /// Revoke this connection's session and close it.
    Logout,
}

/// Messages the server sends over the real-time channel.
///
/// `D` is the puzzle document type. Snapshots and updates carry the whole
/// document: it is replaced wholesale on every accepted mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage<D> {
    /// Current state, sent on join and on `state_request`.
    Snapshot { document: D, version: u64 },
    /// State after an accepted mutation, sent to every member.
    Update { document: D, version: u64 },
    /// A request from this client was refused.
    Error { reason: ErrorReason, message: String },
    /// Reply to [`ClientMessage::Ping`].
    Pong,
}

impl<D> ServerMessage<D> {
    /// Shorthand for an [`ServerMessage::Error`].
    pub fn error(reason: ErrorReason, message: impl Into<String>) -> Self {
        Self::Error {
            reason,
            message: message.into(),
        }
    }
}
