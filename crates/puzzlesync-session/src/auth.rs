//! Login and logout: the only way sessions come into existence.
//!
//! There are two ways in:
//! - **Player**: any non-blank display name, no password.
//! - **Dungeon master**: the shared DM secret, compared in constant time.
//!
//! The gateway holds the secret and a handle to the shared
//! [`SessionStore`]. It is cheap to clone; every clone talks to the same
//! store.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use puzzlesync_protocol::Role;
//! use puzzlesync_session::{AuthGateway, SessionConfig, SessionStore};
//! use tokio::sync::Mutex;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let sessions = Arc::new(Mutex::new(SessionStore::new(SessionConfig::default())));
//! let auth = AuthGateway::new(sessions, "hunter2");
//!
//! let alice = auth.login_player("  Alice ").await.unwrap();
//! assert_eq!(alice.display_name, "Alice");
//! assert_eq!(alice.role, Role::Player);
//!
//! assert!(auth.login_dm("", "wrong").await.is_err());
//! let dm = auth.login_dm("", "hunter2").await.unwrap();
//! assert_eq!(dm.role, Role::DungeonMaster);
//! # }
//! ```

use std::sync::Arc;

use puzzlesync_protocol::Role;
use tokio::sync::Mutex;

use crate::{Session, SessionError, SessionStore};

/// The session store as shared between the gateway, the connection
/// handlers, and the sweep task.
pub type SharedSessions = Arc<Mutex<SessionStore>>;

/// Longest accepted display name, in characters (after trimming).
pub const MAX_DISPLAY_NAME_LEN: usize = 64;

/// Name given to a DM who logs in without one.
pub const DEFAULT_DM_NAME: &str = "Dungeon Master";

/// Issues and revokes sessions.
#[derive(Clone)]
pub struct AuthGateway {
    sessions: SharedSessions,
    dm_secret: Arc<str>,
}

impl AuthGateway {
    pub fn new(sessions: SharedSessions, dm_secret: impl Into<String>) -> Self {
        Self {
            sessions,
            dm_secret: Arc::from(dm_secret.into()),
        }
    }

    /// Logs in a player.
    ///
    /// # Errors
    /// - [`SessionError::InvalidInput`] if the trimmed name is empty or too
    ///   long
    /// - [`SessionError::EntropyUnavailable`] if no token could be minted
    pub async fn login_player(&self, display_name: &str) -> Result<Session, SessionError> {
        let name = normalize_name(display_name)?;
        self.sessions.lock().await.issue(name, Role::Player)
    }

    /// Logs in the dungeon master.
    ///
    /// A blank `display_name` becomes [`DEFAULT_DM_NAME`].
    ///
    /// # Errors
    /// - [`SessionError::Unauthorized`] if `secret` does not match
    /// - [`SessionError::InvalidInput`] if the name is too long
    /// - [`SessionError::EntropyUnavailable`] if no token could be minted
    pub async fn login_dm(
        &self,
        display_name: &str,
        secret: &str,
    ) -> Result<Session, SessionError> {
        if !constant_time_eq(secret.as_bytes(), self.dm_secret.as_bytes()) {
            tracing::warn!("dungeon master login rejected");
            return Err(SessionError::Unauthorized);
        }

        let name = if display_name.trim().is_empty() {
            DEFAULT_DM_NAME
        } else {
            normalize_name(display_name)?
        };
        self.sessions.lock().await.issue(name, Role::DungeonMaster)
    }

    /// Revokes a session. Unknown tokens are ignored.
    pub async fn logout(&self, token: &str) -> Option<Session> {
        self.sessions.lock().await.revoke(token)
    }

    /// Looks up the session behind a token.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] or [`SessionError::Expired`].
    pub async fn validate(&self, token: &str) -> Result<Session, SessionError> {
        self.sessions.lock().await.validate(token)
    }

    /// The underlying store.
    pub fn sessions(&self) -> &SharedSessions {
        &self.sessions
    }
}

impl std::fmt::Debug for AuthGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGateway").finish_non_exhaustive()
    }
}

fn normalize_name(raw: &str) -> Result<&str, SessionError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(SessionError::InvalidInput(
            "display name must not be empty".into(),
        ));
    }
    if name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(SessionError::InvalidInput(format!(
            "display name longer than {MAX_DISPLAY_NAME_LEN} characters"
        )));
    }
    Ok(name)
}

/// Byte comparison whose running time depends only on the lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
