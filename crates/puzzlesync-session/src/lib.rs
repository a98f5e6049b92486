//! Sessions and login for Puzzlesync.
//!
//! This crate answers "who is on the other end of this connection, and
//! what may they do":
//!
//! 1. **Login**: [`AuthGateway`] turns a display name (player) or the DM
//!    secret (dungeon master) into a [`Session`]
//! 2. **Storage**: [`SessionStore`] holds sessions by token and expires
//!    them after a fixed lifetime
//! 3. **Time**: [`Clock`] lets tests pin "now"
//!
//! # How it fits in the stack
//!
//! ```text
//! Connection handler (above)  ← validates the token on every connect
//!     ↕
//! Session layer (this crate)  ← issues, validates, revokes
//!     ↕
//! Protocol layer (below)      ← provides Role, SessionGrant, ErrorReason
//! ```

mod auth;
mod clock;
mod error;
mod session;
mod store;

pub use auth::{AuthGateway, SharedSessions, DEFAULT_DM_NAME, MAX_DISPLAY_NAME_LEN};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SessionError;
pub use session::{token_hint, Session, SessionConfig};
pub use store::{probe_entropy, SessionStore, TOKEN_BYTES};
