//! Network edge of Puzzlesync.
//!
//! A [`Transport`] hands out [`Connection`]s; a connection moves whole
//! frames as bytes and remembers the [`Handshake`] it was opened with
//! (request path, query parameters, cookies). Nothing here knows about
//! sessions, rooms, or message formats.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
mod handshake;
mod id;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use handshake::Handshake;
pub use id::ConnectionId;
#[cfg(feature = "websocket")]
pub use websocket::{
    PendingWebSocket, WebSocketConnection, WebSocketTransport, DEFAULT_UPGRADE_TIMEOUT,
};

use std::net::SocketAddr;

/// A listener producing connections.
///
/// Accepting and upgrading are separate steps so a peer that stalls
/// mid-handshake holds up only its own task, never the listener.
pub trait Transport: Send + Sync + 'static {
    type Pending: PendingConnection;

    /// Waits for the next peer at the socket level.
    ///
    /// An error here concerns one peer only; the listener stays usable.
    async fn accept(&mut self) -> Result<Self::Pending, TransportError>;

    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// A peer that has connected but not finished its protocol handshake.
pub trait PendingConnection: Send + 'static {
    type Connection: Connection;

    fn peer_addr(&self) -> SocketAddr;

    /// Completes the handshake, giving up after the transport's upgrade
    /// timeout.
    async fn upgrade(self) -> Result<Self::Connection, TransportError>;
}

/// One open connection.
///
/// `send` and `recv` may run at the same time from different tasks, so a
/// writer can push room broadcasts while the handler waits on the client.
pub trait Connection: Send + Sync + 'static {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Next frame from the peer, or `Ok(None)` once it has closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Sends a close frame with an application code and reason.
    async fn close(&self, code: u16, reason: &str) -> Result<(), TransportError>;

    fn id(&self) -> ConnectionId;

    fn handshake(&self) -> &Handshake;
}
