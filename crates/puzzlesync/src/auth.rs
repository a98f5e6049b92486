//! The `/auth` endpoint: login, logout, and session lookup over a
//! WebSocket.
//!
//! Each text frame is one [`AuthRequest`]; each gets exactly one
//! [`AuthResponse`]. The connection stays open until the client closes it
//! or goes idle, so a client can log in and look itself up on one socket.

use std::sync::Arc;

use serde::de::IgnoredAny;

use puzzlesync_protocol::{
    close_code, AuthRequest, AuthResponse, Codec, ErrorReason, JsonCodec,
};
use puzzlesync_room::PuzzleLogic;
use puzzlesync_session::{Session, SessionError};
use puzzlesync_transport::{Connection, WebSocketConnection};

use crate::handler::{next_inbound, send_message, Inbound};
use crate::server::ServerState;
use crate::PuzzleSyncError;

pub(crate) async fn serve_auth<P: PuzzleLogic>(
    conn: WebSocketConnection,
    state: Arc<ServerState<P>>,
) -> Result<(), PuzzleSyncError> {
    let conn_id = conn.id();

    loop {
        let data = match next_inbound(&conn, state.idle_timeout).await {
            Inbound::Frame(data) => data,
            Inbound::Closed => break,
            Inbound::Idle => {
                let _ = conn.close(close_code::TIMEOUT, "idle timeout").await;
                break;
            }
            Inbound::Failed(e) => return Err(e.into()),
        };

        let response = match state.codec.decode::<AuthRequest>(&data) {
            Ok(request) => answer(&state, request).await,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode auth request");
                AuthResponse::Error {
                    reason: undecodable_reason(&state.codec, &data),
                    message: e.to_string(),
                }
            }
        };
        send_message(&conn, &state.codec, &response).await?;
    }

    tracing::debug!(%conn_id, "auth connection closed");
    Ok(())
}

async fn answer<P: PuzzleLogic>(state: &ServerState<P>, request: AuthRequest) -> AuthResponse {
    match request {
        AuthRequest::LoginPlayer { display_name } => {
            granted(state.auth.login_player(&display_name).await)
        }
        AuthRequest::LoginDm {
            display_name,
            secret,
        } => granted(state.auth.login_dm(&display_name, &secret).await),
        AuthRequest::Logout { token } => {
            state.logout(&token).await;
            AuthResponse::LoggedOut
        }
        AuthRequest::SessionInfo { token } => granted(state.auth.validate(&token).await),
    }
}

/// A frame that is well-formed but is not a valid request (missing or
/// mistyped fields, unknown `type`) is bad input; anything else is an
/// unreadable message.
fn undecodable_reason(codec: &JsonCodec, data: &[u8]) -> ErrorReason {
    if codec.decode::<IgnoredAny>(data).is_ok() {
        ErrorReason::InvalidInput
    } else {
        ErrorReason::InvalidMessage
    }
}

fn granted(result: Result<Session, SessionError>) -> AuthResponse {
    match result {
        Ok(session) => AuthResponse::Session(session.grant()),
        Err(e) => AuthResponse::Error {
            reason: e.reason(),
            message: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granted_error_maps_reason() {
        let resp = granted(Err(SessionError::Unauthorized));
        assert_eq!(
            resp,
            AuthResponse::Error {
                reason: ErrorReason::Unauthorized,
                message: "unauthorized".into()
            }
        );
    }

    #[test]
    fn test_undecodable_reason_json_missing_field_is_invalid_input() {
        let reason = undecodable_reason(&JsonCodec, br#"{"type":"login_player"}"#);
        assert_eq!(reason, ErrorReason::InvalidInput);
    }

    #[test]
    fn test_undecodable_reason_not_json_is_invalid_message() {
        let reason = undecodable_reason(&JsonCodec, b"login please");
        assert_eq!(reason, ErrorReason::InvalidMessage);
    }

    #[test]
    fn test_granted_entropy_failure_reports_unavailable() {
        let resp = granted(Err(SessionError::EntropyUnavailable("no rng".into())));
        assert!(matches!(
            resp,
            AuthResponse::Error {
                reason: ErrorReason::Unavailable,
                ..
            }
        ));
    }
}
