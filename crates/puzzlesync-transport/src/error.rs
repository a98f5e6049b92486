use std::io;

/// Failures below the message layer. None of these carry puzzle state;
/// the connection handler treats every one as a disconnect.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listener could not be bound or a TCP accept failed.
    #[error("listener error: {0}")]
    Listener(#[source] io::Error),

    /// The HTTP upgrade to WebSocket did not complete.
    #[error("websocket upgrade failed: {0}")]
    Upgrade(String),

    /// The peer is gone; nothing more can be sent.
    #[error("connection closed")]
    Closed,

    /// A frame could not be written.
    #[error("send failed: {0}")]
    Send(String),

    /// A frame could not be read.
    #[error("receive failed: {0}")]
    Receive(String),
}
