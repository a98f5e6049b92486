//! The session store: every session the server has issued and not yet
//! forgotten.
//!
//! # Concurrency note
//!
//! `SessionStore` is NOT thread-safe by itself. It is a plain `HashMap`
//! mutated through `&mut self`; the server shares it behind a
//! [`SharedSessions`](crate::SharedSessions) mutex. Every operation is a
//! short map access, so the lock is never held across an await.
//!
//! ## Lifecycle
//!
//! ```text
//! issue() ──→ [Valid] ──→ validate() ──→ [Valid]
//!                │                          │
//!                │ revoke()                 │ now > expires_at
//!                ▼                          ▼
//!            (removed)                  [Expired] ──→ removed on the
//!                                                     next validate()
//!                                                     or purge_expired()
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use puzzlesync_protocol::Role;
use rand::rngs::OsRng;
use rand::TryRngCore;

use crate::clock::{Clock, SystemClock};
use crate::{Session, SessionConfig, SessionError};

/// Random bytes per token. Rendered as twice as many hex characters.
pub const TOKEN_BYTES: usize = 32;

/// Owns all issued sessions, keyed by token.
pub struct SessionStore {
    sessions: HashMap<String, Session>,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    /// Creates an empty store on the system clock.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates an empty store on the given clock.
    pub fn with_clock(config: SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: HashMap::new(),
            config,
            clock,
        }
    }

    /// Issues a new session and returns a copy of it.
    ///
    /// The caller has already decided that `display_name` and `role` are
    /// acceptable; the store only mints the token and the expiry.
    ///
    /// # Errors
    /// [`SessionError::EntropyUnavailable`] if the OS randomness source
    /// fails. Nothing is stored in that case.
    pub fn issue(
        &mut self,
        display_name: impl Into<String>,
        role: Role,
    ) -> Result<Session, SessionError> {
        let mut token = generate_token()?;
        while self.sessions.contains_key(&token) {
            token = generate_token()?;
        }

        let issued_at = self.clock.now();
        let session = Session {
            token: token.clone(),
            display_name: display_name.into(),
            role,
            issued_at,
            expires_at: expiry(issued_at, &self.config),
        };

        tracing::info!(
            token = session.token_hint(),
            display_name = %session.display_name,
            role = %session.role,
            "session issued"
        );
        self.sessions.insert(token, session.clone());
        Ok(session)
    }

    /// Looks up a token.
    ///
    /// An expired session is removed as a side effect, so a second
    /// `validate` of the same token reports `NotFound`.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] if the token was never issued or was
    ///   revoked
    /// - [`SessionError::Expired`] if `now` is past `expires_at`
    pub fn validate(&mut self, token: &str) -> Result<Session, SessionError> {
        let now = self.clock.now();
        let session = self.sessions.get(token).ok_or(SessionError::NotFound)?;

        if session.is_expired_at(now) {
            tracing::debug!(token = session.token_hint(), "session expired");
            self.sessions.remove(token);
            return Err(SessionError::Expired);
        }

        Ok(session.clone())
    }

    /// Removes a session. Revoking an unknown token is not an error.
    ///
    /// Returns the removed session, if there was one.
    pub fn revoke(&mut self, token: &str) -> Option<Session> {
        let removed = self.sessions.remove(token);
        if let Some(session) = &removed {
            tracing::info!(token = session.token_hint(), "session revoked");
        }
        removed
    }

    /// Drops every session whose expiry has passed.
    ///
    /// Returns how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired_at(now));
        let purged = before - self.sessions.len();
        if purged > 0 {
            tracing::debug!(purged, remaining = self.sessions.len(), "expired sessions purged");
        }
        purged
    }

    /// Number of stored sessions, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// The configured lifetime.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Checks that the OS randomness source works by drawing one token.
///
/// The server calls this at startup so a broken source is reported before
/// the first login rather than on it.
pub fn probe_entropy() -> Result<(), SessionError> {
    generate_token().map(|_| ())
}

/// Generates a token from the OS randomness source.
///
/// 32 bytes, hex-encoded to 64 characters.
fn generate_token() -> Result<String, SessionError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| SessionError::EntropyUnavailable(e.to_string()))?;
    Ok(hex::encode(bytes))
}

fn expiry(issued_at: DateTime<Utc>, config: &SessionConfig) -> DateTime<Utc> {
    let ttl = TimeDelta::from_std(config.ttl).unwrap_or(TimeDelta::MAX);
    issued_at
        .checked_add_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
