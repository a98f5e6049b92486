//! Index of open real-time connections by session token.
//!
//! Logout has to reach every socket opened with the revoked token, not
//! just the one that asked. Each connection registers a `Notify` here;
//! kicking a token wakes all of them.

use std::collections::HashMap;
use std::sync::Arc;

use puzzlesync_session::token_hint;
use puzzlesync_transport::ConnectionId;
use tokio::sync::{Mutex, Notify};

#[derive(Default)]
pub(crate) struct LiveConnections {
    by_token: Mutex<HashMap<String, HashMap<ConnectionId, Arc<Notify>>>>,
}

impl LiveConnections {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a connection and returns the signal that fires when its
    /// session is logged out.
    pub(crate) async fn register(&self, token: &str, conn_id: ConnectionId) -> Arc<Notify> {
        let kick = Arc::new(Notify::new());
        self.by_token
            .lock()
            .await
            .entry(token.to_string())
            .or_default()
            .insert(conn_id, Arc::clone(&kick));
        kick
    }

    pub(crate) async fn unregister(&self, token: &str, conn_id: ConnectionId) {
        let mut by_token = self.by_token.lock().await;
        if let Some(conns) = by_token.get_mut(token) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                by_token.remove(token);
            }
        }
    }

    /// Signals every connection of `token` to close. Returns how many were
    /// signalled.
    ///
    /// `notify_one` stores a permit, so a connection that is busy when the
    /// kick lands still sees it on its next wait.
    pub(crate) async fn kick(&self, token: &str) -> usize {
        let by_token = self.by_token.lock().await;
        let Some(conns) = by_token.get(token) else {
            return 0;
        };
        for kick in conns.values() {
            kick.notify_one();
        }
        tracing::debug!(token = token_hint(token), connections = conns.len(), "kicked connections");
        conns.len()
    }

    /// Number of open connections.
    pub(crate) async fn count(&self) -> usize {
        self.by_token.lock().await.values().map(HashMap::len).sum()
    }
}
