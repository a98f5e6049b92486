//! Auth endpoint messages: login, logout, and session lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ErrorReason, Role};

/// Requests accepted on the auth endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthRequest {
    /// Log in as a player. No password.
    LoginPlayer { display_name: String },
    /// Log in as the dungeon master with the shared secret.
    LoginDm {
        #[serde(default)]
        display_name: String,
        secret: String,
    },
    /// Revoke a session. Succeeds whether or not the token exists.
    Logout { token: String },
    /// Look up who a token belongs to.
    SessionInfo { token: String },
}

/// A session as the client sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionGrant {
    pub token: String,
    pub display_name: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

/// Replies sent on the auth endpoint, one per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthResponse {
    /// Login or lookup succeeded.
    Session(SessionGrant),
    /// Logout processed.
    LoggedOut,
    /// The request was refused.
    Error { reason: ErrorReason, message: String },
}
