//! Error types for the session layer.

use puzzlesync_protocol::ErrorReason;

/// Errors that can occur while logging in or validating a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The login request was malformed (e.g. a blank display name).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The supplied DM secret did not match.
    #[error("unauthorized")]
    Unauthorized,

    /// No session exists for the token. Revoked tokens land here too.
    #[error("session not found")]
    NotFound,

    /// The session existed but its fixed lifetime has passed. It has been
    /// removed; the client must log in again.
    #[error("session expired")]
    Expired,

    /// The operating system's randomness source failed. No token is
    /// issued rather than issuing a weak one.
    #[error("randomness source unavailable: {0}")]
    EntropyUnavailable(String),
}

impl SessionError {
    /// The reason reported to the client for this error.
    pub fn reason(&self) -> ErrorReason {
        match self {
            Self::InvalidInput(_) => ErrorReason::InvalidInput,
            Self::Unauthorized => ErrorReason::Unauthorized,
            Self::NotFound => ErrorReason::NotFound,
            Self::Expired => ErrorReason::Expired,
            Self::EntropyUnavailable(_) => ErrorReason::Unavailable,
        }
    }
}
