//! Per-connection handler: handshake, session check, and message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The `/auth` path goes to the auth endpoint; every other path is the
//! real-time channel:
//!   1. Read room id and session token from the handshake
//!   2. Validate the session → close with 4401 if it is unknown or expired
//!   3. Join the room → the room queues a snapshot
//!   4. Writer task drains room output into the socket; this task reads
//!      client messages until close, idle timeout, lag, or logout

use std::sync::Arc;
use std::time::Duration;

use puzzlesync_protocol::{
    close_code, ClientMessage, Codec, ErrorReason, JsonCodec, RoomId, ServerMessage,
};
use puzzlesync_room::{
    member_channel, Member, MemberReceiver, MemberSender, PuzzleLogic, RoomError, RoomHandle,
};
use puzzlesync_session::{token_hint, Session};
use puzzlesync_transport::{
    Connection, ConnectionId, Handshake, TransportError, WebSocketConnection,
};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::auth::serve_auth;
use crate::server::ServerState;
use crate::PuzzleSyncError;

/// Path of the auth endpoint.
pub const AUTH_PATH: &str = "/auth";

/// Query parameter carrying the session token.
pub const TOKEN_PARAM: &str = "token";

/// Cookie carrying the session token when the query has none.
pub const SESSION_COOKIE: &str = "session_id";

/// Query parameter carrying the room id.
pub const ROOM_PARAM: &str = "room";

/// How many times a join is retried when the room is evicted under it.
const JOIN_ATTEMPTS: usize = 3;

/// Drop guard that removes the connection from its room and from the
/// live-connection index when the handler exits.
///
/// This ensures cleanup happens on every exit path, panics included.
/// Since `Drop` is synchronous, we spawn a fire-and-forget task.
struct ConnectionGuard<P: PuzzleLogic> {
    conn_id: ConnectionId,
    token: String,
    room: RoomHandle<P>,
    state: Arc<ServerState<P>>,
}

impl<P: PuzzleLogic> Drop for ConnectionGuard<P> {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let token = std::mem::take(&mut self.token);
        let room = self.room.clone();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            if let Err(e) = room.leave(conn_id).await {
                tracing::debug!(%conn_id, error = %e, "leave on disconnect skipped");
            }
            state.live.unregister(&token, conn_id).await;
        });
    }
}

/// One read from the client, with the idle timeout applied.
pub(crate) enum Inbound {
    Frame(Vec<u8>),
    Closed,
    Idle,
    Failed(TransportError),
}

pub(crate) async fn next_inbound(conn: &WebSocketConnection, idle: Option<Duration>) -> Inbound {
    let read = match idle {
        Some(limit) => match tokio::time::timeout(limit, conn.recv()).await {
            Ok(read) => read,
            Err(_) => return Inbound::Idle,
        },
        None => conn.recv().await,
    };
    match read {
        Ok(Some(data)) => Inbound::Frame(data),
        Ok(None) => Inbound::Closed,
        Err(e) => Inbound::Failed(e),
    }
}

/// Why the real-time loop ended. Decides the close frame.
#[derive(Debug, PartialEq, Eq)]
enum Exit {
    ClientClosed,
    TransportFailed,
    Idle,
    LoggedOut,
    Lagged,
}

/// Why the writer task ended.
#[derive(Debug, PartialEq, Eq)]
enum WriterExit {
    /// The room closed the member channel.
    Dropped,
    SendFailed,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<P: PuzzleLogic>(
    conn: WebSocketConnection,
    state: Arc<ServerState<P>>,
) -> Result<(), PuzzleSyncError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, path = conn.handshake().path(), "handling new connection");

    if conn.handshake().path().trim_end_matches('/') == AUTH_PATH {
        serve_auth(conn, state).await
    } else {
        serve_realtime(Arc::new(conn), state).await
    }
}

async fn serve_realtime<P: PuzzleLogic>(
    conn: Arc<WebSocketConnection>,
    state: Arc<ServerState<P>>,
) -> Result<(), PuzzleSyncError> {
    let conn_id = conn.id();

    // --- Step 1: Handshake parameters ---
    let room_id = match room_from_handshake(conn.handshake()) {
        Ok(room_id) => room_id,
        Err(message) => {
            refuse(
                &conn,
                &state.codec,
                ErrorReason::InvalidInput,
                &message,
                close_code::INVALID_HANDSHAKE,
            )
            .await?;
            return Ok(());
        }
    };
    let Some(token) = token_from_handshake(conn.handshake()) else {
        refuse(
            &conn,
            &state.codec,
            ErrorReason::NotFound,
            "missing session token",
            close_code::AUTH_FAILED,
        )
        .await?;
        return Ok(());
    };

    // --- Step 2: Session ---
    let session = match state.auth.validate(&token).await {
        Ok(session) => session,
        Err(e) => {
            tracing::info!(%conn_id, token = token_hint(&token), error = %e, "connection refused");
            refuse(&conn, &state.codec, e.reason(), &e.to_string(), close_code::AUTH_FAILED).await?;
            return Ok(());
        }
    };

    let kick = state.live.register(&session.token, conn_id).await;
    // A logout that landed between validation and registration missed
    // this connection's kick signal; check again now that it is visible.
    if let Err(e) = state.auth.validate(&session.token).await {
        state.live.unregister(&session.token, conn_id).await;
        refuse(&conn, &state.codec, e.reason(), &e.to_string(), close_code::AUTH_FAILED).await?;
        return Ok(());
    }

    // --- Step 3: Room ---
    let (sender, receiver) = member_channel::<P>();
    let room = match join_room(&state, &room_id, conn_id, &session, sender).await {
        Ok(room) => room,
        Err(e) => {
            state.live.unregister(&session.token, conn_id).await;
            tracing::warn!(%conn_id, %room_id, error = %e, "join failed");
            refuse(
                &conn,
                &state.codec,
                ErrorReason::Unavailable,
                &e.to_string(),
                close_code::UNAVAILABLE,
            )
            .await?;
            return Ok(());
        }
    };

    let _guard = ConnectionGuard {
        conn_id,
        token: session.token.clone(),
        room: room.clone(),
        state: Arc::clone(&state),
    };

    tracing::info!(
        %conn_id,
        %room_id,
        display_name = %session.display_name,
        role = %session.role,
        "connected"
    );

    // --- Step 4: Message loop ---
    let mut writer = tokio::spawn(write_outbound::<P>(Arc::clone(&conn), state.codec, receiver));
    let exit = read_loop(&conn, &state, &room, &session, &kick, &mut writer).await;
    writer.abort();

    tracing::info!(%conn_id, %room_id, reason = ?exit, "disconnected");

    match exit {
        Exit::ClientClosed | Exit::TransportFailed => {}
        Exit::Idle => {
            let _ = conn.close(close_code::TIMEOUT, "idle timeout").await;
        }
        Exit::LoggedOut => {
            let _ = conn.close(close_code::LOGGED_OUT, "logged out").await;
        }
        Exit::Lagged => {
            let _ = send_message(
                &conn,
                &state.codec,
                &ServerMessage::<()>::error(ErrorReason::Lagged, "fell too far behind the room"),
            )
            .await;
            let _ = conn.close(close_code::TIMEOUT, "lagged").await;
        }
    }

    // _guard drops here → leave + unregister fire.
    Ok(())
}

async fn read_loop<P: PuzzleLogic>(
    conn: &WebSocketConnection,
    state: &ServerState<P>,
    room: &RoomHandle<P>,
    session: &Session,
    kick: &Notify,
    writer: &mut JoinHandle<WriterExit>,
) -> Exit {
    let conn_id = conn.id();

    loop {
        let inbound = tokio::select! {
            inbound = next_inbound(conn, state.idle_timeout) => inbound,
            _ = kick.notified() => return Exit::LoggedOut,
            finished = &mut *writer => {
                return match finished {
                    Ok(WriterExit::Dropped) => Exit::Lagged,
                    _ => Exit::TransportFailed,
                };
            }
        };

        let data = match inbound {
            Inbound::Frame(data) => data,
            Inbound::Closed => return Exit::ClientClosed,
            Inbound::Idle => return Exit::Idle,
            Inbound::Failed(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                return Exit::TransportFailed;
            }
        };

        let msg: ClientMessage<P::Operation> = match state.codec.decode(&data) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode client message");
                let reply = ServerMessage::<()>::error(ErrorReason::InvalidMessage, e.to_string());
                if send_message(conn, &state.codec, &reply).await.is_err() {
                    return Exit::TransportFailed;
                }
                continue;
            }
        };

        match msg {
            ClientMessage::Operation { payload } => match room.apply(conn_id, payload).await {
                Ok(outcome) => tracing::debug!(%conn_id, ?outcome, "operation handled"),
                Err(e) => return membership_lost(conn_id, e),
            },
            ClientMessage::StateRequest => {
                if let Err(e) = room.resync(conn_id).await {
                    return membership_lost(conn_id, e);
                }
            }
            ClientMessage::Ping => {
                if send_message(conn, &state.codec, &ServerMessage::<()>::Pong).await.is_err() {
                    return Exit::TransportFailed;
                }
            }
            ClientMessage::Logout => {
                state.logout(&session.token).await;
                return Exit::LoggedOut;
            }
        }
    }
}

/// The room no longer has this connection. The only way that happens to a
/// live member is being dropped for falling behind.
fn membership_lost(conn_id: ConnectionId, e: RoomError) -> Exit {
    tracing::debug!(%conn_id, error = %e, "no longer a room member");
    Exit::Lagged
}

/// Drains the member channel into the socket.
async fn write_outbound<P: PuzzleLogic>(
    conn: Arc<WebSocketConnection>,
    codec: JsonCodec,
    mut receiver: MemberReceiver<P>,
) -> WriterExit {
    while let Some(outbound) = receiver.recv().await {
        let bytes = match codec.encode(&outbound.to_message()) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(conn_id = %conn.id(), error = %e, "failed to encode outbound message");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(conn_id = %conn.id(), error = %e, "send failed");
            return WriterExit::SendFailed;
        }
    }
    WriterExit::Dropped
}

/// Joins `room_id`, retrying when the room is evicted between lookup and
/// join.
async fn join_room<P: PuzzleLogic>(
    state: &ServerState<P>,
    room_id: &RoomId,
    conn_id: ConnectionId,
    session: &Session,
    sender: MemberSender<P>,
) -> Result<RoomHandle<P>, RoomError> {
    for attempt in 1..=JOIN_ATTEMPTS {
        let room = state.rooms.get_or_create(room_id).await;
        let member = Member {
            conn_id,
            display_name: session.display_name.clone(),
            role: session.role,
            sender: sender.clone(),
        };
        match room.join(member).await {
            Ok(()) => return Ok(room),
            Err(RoomError::Unavailable(_)) => {
                tracing::debug!(%conn_id, %room_id, attempt, "room evicted during join, retrying");
            }
            Err(e) => return Err(e),
        }
    }
    Err(RoomError::Unavailable(room_id.clone()))
}

/// Room id from `?room=`, else from a `/ws/{room}` path.
fn room_from_handshake(handshake: &Handshake) -> Result<RoomId, String> {
    let raw = match handshake.query(ROOM_PARAM) {
        Some(room) => room.to_string(),
        None => {
            let segments: Vec<String> = handshake.path_segments().collect();
            match segments.as_slice() {
                [ws, room] if ws == "ws" => room.clone(),
                _ => return Err("missing room id".to_string()),
            }
        }
    };
    RoomId::parse(&raw).map_err(|e| e.to_string())
}

/// Token from `?token=`, else from the `session_id` cookie.
fn token_from_handshake(handshake: &Handshake) -> Option<String> {
    handshake
        .query(TOKEN_PARAM)
        .or_else(|| handshake.cookie(SESSION_COOKIE))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Sends one error frame and closes the connection.
async fn refuse(
    conn: &WebSocketConnection,
    codec: &JsonCodec,
    reason: ErrorReason,
    message: &str,
    code: u16,
) -> Result<(), PuzzleSyncError> {
    send_message(conn, codec, &ServerMessage::<()>::error(reason, message)).await?;
    conn.close(code, message).await?;
    Ok(())
}

pub(crate) async fn send_message<T: serde::Serialize>(
    conn: &WebSocketConnection,
    codec: &JsonCodec,
    msg: &T,
) -> Result<(), PuzzleSyncError> {
    let bytes = codec.encode(msg)?;
    conn.send(&bytes).await?;
    Ok(())
}
