//! The `PuzzleLogic` trait: what a puzzle plugs into the framework.
//!
//! The framework owns rooms, members, versions, and broadcast. The puzzle
//! only says what its document looks like, who may perform each operation,
//! and how an operation turns one document into the next.

use puzzlesync_protocol::Role;
use serde::{de::DeserializeOwned, Serialize};

use crate::RoomConfig;

/// The trait puzzle implementations provide.
///
/// - `Document`: the whole shared state of one room. It is replaced
///   wholesale on every accepted operation and sent in full to clients.
/// - `Operation`: one mutation request, as the client sends it inside
///   `{"type": "operation", "payload": ...}`.
///
/// All methods are associated functions: a puzzle has no per-room state
/// outside its document.
pub trait PuzzleLogic: Send + Sync + 'static {
    /// The shared document.
    type Document: Send + Sync + Serialize + DeserializeOwned + 'static;

    /// A mutation request.
    type Operation: Send + Serialize + DeserializeOwned + 'static;

    /// The document a freshly created room starts with (at version 0).
    fn initial_document() -> Self::Document;

    /// The least-privileged role allowed to perform `op`.
    ///
    /// Checked by the room before [`apply`](Self::apply) is called. A
    /// member below this role gets a `forbidden` rejection and the
    /// document is untouched.
    fn required_role(op: &Self::Operation) -> Role;

    /// Produces the next document.
    ///
    /// Returning `Err(reason)` rejects the operation: nothing changes, the
    /// version does not move, and only the sender hears about it.
    fn apply(document: &Self::Document, op: Self::Operation) -> Result<Self::Document, String>;

    /// Room settings for this puzzle. Default: `RoomConfig::default()`.
    fn room_config() -> RoomConfig {
        RoomConfig::default()
    }
}
