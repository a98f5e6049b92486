//! `PuzzleServer` builder and server loop.
//!
//! This is the entry point for running a Puzzlesync server. It ties
//! together all the layers: transport → protocol → session → room.

use std::sync::Arc;
use std::time::Duration;

use puzzlesync_protocol::JsonCodec;
use puzzlesync_room::{PuzzleLogic, RoomRegistry};
use puzzlesync_session::{
    probe_entropy, token_hint, AuthGateway, Clock, SessionConfig, SessionStore, SystemClock,
};
use puzzlesync_transport::{PendingConnection, Transport, WebSocketTransport};
use tokio::sync::Mutex;

use crate::connections::LiveConnections;
use crate::handler::handle_connection;
use crate::{PuzzleSyncError, ServerConfig};

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. Each field
/// does its own locking; none is held across another's.
pub(crate) struct ServerState<P: PuzzleLogic> {
    pub(crate) auth: AuthGateway,
    pub(crate) rooms: Arc<RoomRegistry<P>>,
    pub(crate) live: LiveConnections,
    pub(crate) codec: JsonCodec,
    pub(crate) idle_timeout: Option<Duration>,
}

impl<P: PuzzleLogic> ServerState<P> {
    /// Revokes `token` and closes every real-time connection using it.
    /// Idempotent.
    pub(crate) async fn logout(&self, token: &str) {
        let revoked = self.auth.logout(token).await.is_some();
        let kicked = self.live.kick(token).await;
        tracing::info!(token = token_hint(token), revoked, kicked, "logout");
    }
}

/// Builder for configuring and starting a Puzzlesync server.
///
/// # Example
///
/// ```rust,ignore
/// use puzzlesync::prelude::*;
///
/// let server = PuzzleServer::builder()
///     .bind("0.0.0.0:8080")
///     .dm_secret("hunter2")
///     .build::<MyPuzzle>()
///     .await?;
/// server.run().await
/// ```
pub struct PuzzleServerBuilder {
    config: ServerConfig,
    clock: Arc<dyn Clock>,
}

impl PuzzleServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::from_config(ServerConfig::default())
    }

    /// Starts from an existing configuration.
    pub fn from_config(config: ServerConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the dungeon-master secret.
    pub fn dm_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.dm_secret = secret.into();
        self
    }

    /// Sets the idle timeout. `None` disables it.
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Sets the expired-session sweep interval. `None` disables it.
    pub fn sweep_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    /// Sets how long a peer may take to complete the WebSocket upgrade.
    pub fn upgrade_timeout(mut self, timeout: Duration) -> Self {
        self.config.upgrade_timeout = timeout;
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    /// Replaces the clock sessions are issued and expired against.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Binds the listener and prepares shared state for puzzle `P`.
    ///
    /// # Errors
    /// - [`PuzzleSyncError::Session`] if the OS randomness source is
    ///   unusable. Starting anyway would make every login fail.
    /// - [`PuzzleSyncError::Transport`] if the address cannot be bound.
    pub async fn build<P: PuzzleLogic>(self) -> Result<PuzzleServer<P>, PuzzleSyncError> {
        probe_entropy()?;

        let transport = WebSocketTransport::bind(&self.config.bind_addr)
            .await?
            .with_upgrade_timeout(self.config.upgrade_timeout);

        let store = SessionStore::with_clock(self.config.session.clone(), self.clock);
        let auth = AuthGateway::new(Arc::new(Mutex::new(store)), self.config.dm_secret.clone());

        let state = Arc::new(ServerState {
            auth,
            rooms: RoomRegistry::new(),
            live: LiveConnections::new(),
            codec: JsonCodec,
            idle_timeout: self.config.idle_timeout,
        });

        Ok(PuzzleServer {
            transport,
            state,
            sweep_interval: self.config.sweep_interval,
        })
    }
}

impl Default for PuzzleServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A Puzzlesync server for puzzle `P`, bound but not yet accepting.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct PuzzleServer<P: PuzzleLogic> {
    transport: WebSocketTransport,
    state: Arc<ServerState<P>>,
    sweep_interval: Option<Duration>,
}

impl<P: PuzzleLogic> PuzzleServer<P> {
    /// Creates a new builder.
    pub fn builder() -> PuzzleServerBuilder {
        PuzzleServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The login gateway, for embedding the server behind another
    /// front end.
    ///
    /// Logging out through this handle revokes the token but does not
    /// close sockets already open with it; the `/auth` endpoint and the
    /// real-time `logout` message do both.
    pub fn auth(&self) -> AuthGateway {
        self.state.auth.clone()
    }

    /// The room registry.
    pub fn rooms(&self) -> Arc<RoomRegistry<P>> {
        Arc::clone(&self.state.rooms)
    }

    /// Runs the server accept loop.
    ///
    /// Spawns the session sweep (if configured), then accepts connections
    /// and spawns a task for each that completes the upgrade and runs the
    /// handler. The loop itself never waits on a peer's handshake. Runs until the process is
    /// terminated.
    pub async fn run(mut self) -> Result<(), PuzzleSyncError> {
        if let Some(every) = self.sweep_interval {
            tokio::spawn(sweep_sessions(self.state.auth.clone(), every));
        }

        tracing::info!(addr = ?self.local_addr().ok(), "Puzzlesync server running");

        loop {
            match self.transport.accept().await {
                Ok(pending) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let peer = pending.peer_addr();
                        let conn = match pending.upgrade().await {
                            Ok(conn) => conn,
                            Err(e) => {
                                tracing::debug!(%peer, error = %e, "upgrade failed");
                                return;
                            }
                        };
                        if let Err(e) = handle_connection::<P>(conn, state).await {
                            tracing::debug!(%peer, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Periodically drops expired sessions so abandoned tokens do not pile up.
async fn sweep_sessions(auth: AuthGateway, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let purged = auth.sessions().lock().await.purge_expired();
        if purged > 0 {
            tracing::info!(purged, "expired sessions swept");
        }
    }
}
