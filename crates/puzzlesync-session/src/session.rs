//! Session types: the server's record of a successful login.
//!
//! A session answers three questions about whoever presents its token:
//! - WHO they are (`display_name`)
//! - WHAT they may do (`role`)
//! - UNTIL WHEN (`expires_at`, fixed at issuance, never extended)

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use puzzlesync_protocol::{Role, SessionGrant};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Lifetime of a session, counted from issuance. Activity does not
    /// extend it.
    ///
    /// Default: 24 hours.
    pub ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// An issued, time-bounded proof of identity and role.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque bearer token: 64 hex characters (256 random bits).
    pub token: String,

    /// Name shown to other members of a room.
    pub display_name: String,

    pub role: Role,

    pub issued_at: DateTime<Utc>,

    /// `issued_at + ttl`. The session is valid up to and including this
    /// instant.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Returns `true` once `now` is past `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// A short token prefix that is safe to put in logs.
    pub fn token_hint(&self) -> &str {
        token_hint(&self.token)
    }

    /// The client-facing view of this session.
    pub fn grant(&self) -> SessionGrant {
        SessionGrant {
            token: self.token.clone(),
            display_name: self.display_name.clone(),
            role: self.role,
            expires_at: self.expires_at,
        }
    }
}

/// Tokens are bearer credentials, so `Debug` only shows the hint.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &format_args!("{}...", self.token_hint()))
            .field("display_name", &self.display_name)
            .field("role", &self.role)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// First 8 characters of a token (or fewer if it is shorter).
pub fn token_hint(token: &str) -> &str {
    match token.char_indices().nth(8) {
        Some((idx, _)) => &token[..idx],
        None => token,
    }
}
