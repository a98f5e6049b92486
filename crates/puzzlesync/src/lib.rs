//! # Puzzlesync
//!
//! Real-time shared puzzle state over WebSockets.
//!
//! Clients log in as a player (display name) or as the dungeon master
//! (shared secret), open a real-time connection to a room, and from then
//! on see every accepted change to that room's puzzle document, in order.
//! A puzzle plugs in by implementing one trait, [`PuzzleLogic`]; the
//! framework handles sessions, rooms, versions, and fan-out.
//!
//! ## Endpoints
//!
//! | path | purpose |
//! |---|---|
//! | `/auth` | `login_player`, `login_dm`, `logout`, `session_info` |
//! | `/ws/{room}?token=...` | real-time channel (token may also come from the `session_id` cookie, room from `?room=`) |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use puzzlesync::prelude::*;
//!
//! // Implement PuzzleLogic for your puzzle, then:
//! // let server = PuzzleServer::builder()
//! //     .bind("0.0.0.0:8080")
//! //     .build::<MyPuzzle>()
//! //     .await?;
//! // server.run().await
//! ```

mod auth;
mod config;
mod connections;
mod error;
mod handler;
mod server;

pub use config::{
    ServerConfig, ENV_BIND, ENV_DM_PASSWORD, ENV_IDLE_TIMEOUT_SECS, ENV_SWEEP_INTERVAL_SECS,
};
pub use error::PuzzleSyncError;
pub use handler::{AUTH_PATH, ROOM_PARAM, SESSION_COOKIE, TOKEN_PARAM};
pub use server::{PuzzleServer, PuzzleServerBuilder};

pub use puzzlesync_protocol::{
    close_code, AuthRequest, AuthResponse, ClientMessage, ErrorReason, Role, RoomId,
    ServerMessage, SessionGrant,
};
pub use puzzlesync_room::{PuzzleLogic, RoomConfig, RoomInfo, RoomRegistry, RoomState};
pub use puzzlesync_session::{
    AuthGateway, Clock, ManualClock, Session, SessionConfig, SessionError, SystemClock,
};

/// Everything needed to implement a puzzle and run a server.
pub mod prelude {
    pub use crate::{
        PuzzleLogic, PuzzleServer, PuzzleServerBuilder, PuzzleSyncError, Role, RoomConfig,
        ServerConfig, SessionConfig,
    };
}
