//! Integration tests for the Puzzlesync server, handler, and full
//! connection flow over real WebSockets.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use puzzlesync::prelude::*;
use puzzlesync::{close_code, ManualClock, RoomRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Mock puzzle: a set of highlighted cubes
// =========================================================================

struct Highlights;

#[derive(Clone, Default, Serialize, Deserialize)]
struct Board {
    highlighted: BTreeSet<String>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum BoardOp {
    Toggle { cube_id: String },
    Reset,
}

impl PuzzleLogic for Highlights {
    type Document = Board;
    type Operation = BoardOp;

    fn initial_document() -> Board {
        Board::default()
    }

    fn required_role(op: &BoardOp) -> Role {
        match op {
            BoardOp::Toggle { .. } => Role::Player,
            BoardOp::Reset => Role::DungeonMaster,
        }
    }

    fn apply(board: &Board, op: BoardOp) -> Result<Board, String> {
        let mut next = board.clone();
        match op {
            BoardOp::Toggle { cube_id } => {
                if cube_id.trim().is_empty() {
                    return Err("cube_id must not be empty".into());
                }
                if !next.highlighted.remove(&cube_id) {
                    next.highlighted.insert(cube_id);
                }
            }
            BoardOp::Reset => next.highlighted.clear(),
        }
        Ok(next)
    }
}

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct TestServer {
    addr: String,
    rooms: Arc<RoomRegistry<Highlights>>,
}

fn test_builder() -> PuzzleServerBuilder {
    PuzzleServer::<Highlights>::builder()
        .bind("127.0.0.1:0")
        .dm_secret("dm123")
        .idle_timeout(None)
        .sweep_interval(None)
}

/// Starts a server on a random port.
async fn start(builder: PuzzleServerBuilder) -> TestServer {
    let server = builder
        .build::<Highlights>()
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();
    let rooms = server.rooms();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    TestServer { addr, rooms }
}

async fn start_server() -> TestServer {
    start(test_builder()).await
}

async fn connect_path(addr: &str, path: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}{path}"))
        .await
        .expect("should connect");
    ws
}

async fn connect_room(addr: &str, room: &str, token: &str) -> ClientWs {
    connect_path(addr, &format!("/ws/{room}?token={token}")).await
}

async fn send_json(ws: &mut ClientWs, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send should succeed");
}

/// Next text frame as JSON. Panics on close or timeout.
async fn recv_json(ws: &mut ClientWs) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Close(frame) => panic!("unexpected close: {frame:?}"),
            _ => continue,
        }
    }
}

/// Waits for a close frame and returns its code.
async fn recv_close(ws: &mut ClientWs) -> u16 {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for close")
            .expect("stream ended before close frame")
            .expect("websocket error");
        match msg {
            Message::Close(Some(frame)) => return u16::from(frame.code),
            Message::Close(None) => panic!("close frame without code"),
            _ => continue,
        }
    }
}

async fn auth_call(addr: &str, request: Value) -> Value {
    let mut ws = connect_path(addr, "/auth").await;
    send_json(&mut ws, request).await;
    let reply = recv_json(&mut ws).await;
    let _ = ws.close(None).await;
    reply
}

async fn login_player(addr: &str, name: &str) -> String {
    let reply = auth_call(addr, json!({"type": "login_player", "display_name": name})).await;
    assert_eq!(reply["type"], "session", "{reply}");
    reply["token"].as_str().unwrap().to_string()
}

async fn login_dm(addr: &str) -> String {
    let reply = auth_call(addr, json!({"type": "login_dm", "secret": "dm123"})).await;
    assert_eq!(reply["type"], "session", "{reply}");
    assert_eq!(reply["role"], "dungeon_master");
    reply["token"].as_str().unwrap().to_string()
}

fn toggle(cube: &str) -> Value {
    json!({"type": "operation", "payload": {"action": "toggle", "cube_id": cube}})
}

fn reset() -> Value {
    json!({"type": "operation", "payload": {"action": "reset"}})
}

/// Sends a ping and asserts the very next frame is the pong, proving
/// nothing else was queued ahead of it.
async fn assert_nothing_pending(ws: &mut ClientWs) {
    send_json(ws, json!({"type": "ping"})).await;
    assert_eq!(recv_json(ws).await, json!({"type": "pong"}));
}

async fn wait_for_room_count(rooms: &RoomRegistry<Highlights>, expected: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while rooms.room_count().await != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("room count never reached expected value");
}

// =========================================================================
// Auth endpoint
// =========================================================================

#[tokio::test]
async fn test_auth_login_player_returns_session() {
    let server = start_server().await;

    let reply = auth_call(
        &server.addr,
        json!({"type": "login_player", "display_name": "  Alice "}),
    )
    .await;

    assert_eq!(reply["type"], "session");
    assert_eq!(reply["display_name"], "Alice");
    assert_eq!(reply["role"], "player");
    assert_eq!(reply["token"].as_str().unwrap().len(), 64);
    assert!(reply["expires_at"].is_string());
}

#[tokio::test]
async fn test_auth_login_player_blank_name_returns_invalid_input() {
    let server = start_server().await;

    let reply = auth_call(&server.addr, json!({"type": "login_player", "display_name": "  "})).await;

    assert_eq!(reply["type"], "error");
    assert_eq!(reply["reason"], "invalid_input");
}

#[tokio::test]
async fn test_auth_login_player_missing_name_returns_invalid_input() {
    let server = start_server().await;

    let reply = auth_call(&server.addr, json!({"type": "login_player"})).await;

    assert_eq!(reply["type"], "error");
    assert_eq!(reply["reason"], "invalid_input");
}

#[tokio::test]
async fn test_auth_login_dm_wrong_secret_returns_unauthorized() {
    let server = start_server().await;

    let reply = auth_call(
        &server.addr,
        json!({"type": "login_dm", "display_name": "Gary", "secret": "nope"}),
    )
    .await;

    assert_eq!(reply["type"], "error");
    assert_eq!(reply["reason"], "unauthorized");
}

#[tokio::test]
async fn test_auth_session_info_and_logout() {
    let server = start_server().await;
    let token = login_player(&server.addr, "Alice").await;

    let info = auth_call(&server.addr, json!({"type": "session_info", "token": token})).await;
    assert_eq!(info["display_name"], "Alice");

    let out = auth_call(&server.addr, json!({"type": "logout", "token": token})).await;
    assert_eq!(out, json!({"type": "logged_out"}));

    let again = auth_call(&server.addr, json!({"type": "logout", "token": token})).await;
    assert_eq!(again, json!({"type": "logged_out"}));

    let gone = auth_call(&server.addr, json!({"type": "session_info", "token": token})).await;
    assert_eq!(gone["reason"], "not_found");
}

#[tokio::test]
async fn test_auth_several_requests_on_one_socket() {
    let server = start_server().await;
    let mut ws = connect_path(&server.addr, "/auth").await;

    send_json(&mut ws, json!({"type": "login_player", "display_name": "Bob"})).await;
    let session = recv_json(&mut ws).await;
    let token = session["token"].as_str().unwrap().to_string();

    send_json(&mut ws, json!({"type": "session_info", "token": token})).await;
    assert_eq!(recv_json(&mut ws).await["display_name"], "Bob");

    send_json(&mut ws, json!({"type": "fly"})).await;
    assert_eq!(recv_json(&mut ws).await["reason"], "invalid_input");

    ws.send(Message::Text("not json".into())).await.unwrap();
    assert_eq!(recv_json(&mut ws).await["reason"], "invalid_message");
}

// =========================================================================
// Real-time handshake
// =========================================================================

#[tokio::test]
async fn test_silent_tcp_peer_does_not_block_other_clients() {
    let server = start(test_builder().upgrade_timeout(Duration::from_secs(30))).await;

    // Opens TCP and never sends the HTTP upgrade.
    let _silent = tokio::net::TcpStream::connect(server.addr.as_str())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let token = tokio::time::timeout(Duration::from_secs(3), login_player(&server.addr, "Alice"))
        .await
        .expect("login should not wait on the silent peer");
    let mut ws = connect_room(&server.addr, "table1", &token).await;
    assert_eq!(recv_json(&mut ws).await["type"], "snapshot");
}

#[tokio::test]
async fn test_connect_unknown_token_closes_with_4401() {
    let server = start_server().await;
    let mut ws = connect_room(&server.addr, "table1", "not-a-token").await;

    let err = recv_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["reason"], "not_found");
    assert_eq!(recv_close(&mut ws).await, close_code::AUTH_FAILED);
    assert_eq!(server.rooms.room_count().await, 0);
}

#[tokio::test]
async fn test_connect_missing_token_closes_with_4401() {
    let server = start_server().await;
    let mut ws = connect_path(&server.addr, "/ws/table1").await;

    assert_eq!(recv_json(&mut ws).await["reason"], "not_found");
    assert_eq!(recv_close(&mut ws).await, close_code::AUTH_FAILED);
}

#[tokio::test]
async fn test_connect_missing_room_closes_with_4400() {
    let server = start_server().await;
    let token = login_player(&server.addr, "Alice").await;
    let mut ws = connect_path(&server.addr, &format!("/?token={token}")).await;

    assert_eq!(recv_json(&mut ws).await["reason"], "invalid_input");
    assert_eq!(recv_close(&mut ws).await, close_code::INVALID_HANDSHAKE);
}

#[tokio::test]
async fn test_connect_expired_token_closes_with_4401() {
    let clock = ManualClock::new(chrono::Utc::now());
    let server = start(
        test_builder()
            .session_config(SessionConfig {
                ttl: Duration::from_secs(60),
            })
            .clock(Arc::new(clock.clone())),
    )
    .await;
    let token = login_player(&server.addr, "Alice").await;

    clock.advance(Duration::from_secs(61));
    let mut ws = connect_room(&server.addr, "table1", &token).await;

    assert_eq!(recv_json(&mut ws).await["reason"], "expired");
    assert_eq!(recv_close(&mut ws).await, close_code::AUTH_FAILED);
}

#[tokio::test]
async fn test_connect_with_session_cookie() {
    let server = start_server().await;
    let token = login_player(&server.addr, "Alice").await;

    let mut request = format!("ws://{}/ws/table1", server.addr)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("Cookie", format!("session_id={token}").parse().unwrap());
    let (mut ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();

    let snapshot = recv_json(&mut ws).await;
    assert_eq!(snapshot["type"], "snapshot");
    assert_eq!(snapshot["version"], 0);
}

#[tokio::test]
async fn test_connect_room_from_query() {
    let server = start_server().await;
    let token = login_player(&server.addr, "Alice").await;
    let mut ws = connect_path(&server.addr, &format!("/?room=attic&token={token}")).await;

    assert_eq!(recv_json(&mut ws).await["type"], "snapshot");
    let ids = server.rooms.room_ids().await;
    assert_eq!(ids.len(), 1);
    assert_eq!(ids[0].as_str(), "attic");
}

// =========================================================================
// Real-time channel
// =========================================================================

#[tokio::test]
async fn test_dm_and_player_walkthrough() {
    let server = start_server().await;
    let dm_token = login_dm(&server.addr).await;
    let alice_token = login_player(&server.addr, "Alice").await;

    let mut dm = connect_room(&server.addr, "table1", &dm_token).await;
    let mut alice = connect_room(&server.addr, "table1", &alice_token).await;

    let empty = json!({"highlighted": []});
    assert_eq!(
        recv_json(&mut dm).await,
        json!({"type": "snapshot", "document": empty, "version": 0})
    );
    assert_eq!(
        recv_json(&mut alice).await,
        json!({"type": "snapshot", "document": empty, "version": 0})
    );

    // Alice highlights a cube: both see version 1.
    send_json(&mut alice, toggle("c1")).await;
    let expected = json!({"type": "update", "document": {"highlighted": ["c1"]}, "version": 1});
    assert_eq!(recv_json(&mut alice).await, expected);
    assert_eq!(recv_json(&mut dm).await, expected);

    // Alice may not reset: only she hears about it.
    send_json(&mut alice, reset()).await;
    let err = recv_json(&mut alice).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["reason"], "forbidden");
    assert_nothing_pending(&mut dm).await;

    // The DM may.
    send_json(&mut dm, reset()).await;
    let expected = json!({"type": "update", "document": empty, "version": 2});
    assert_eq!(recv_json(&mut dm).await, expected);
    assert_eq!(recv_json(&mut alice).await, expected);
}

#[tokio::test]
async fn test_late_joiner_snapshot_matches_latest_update() {
    let server = start_server().await;
    let token = login_player(&server.addr, "Alice").await;
    let mut alice = connect_room(&server.addr, "r", &token).await;
    recv_json(&mut alice).await;

    send_json(&mut alice, toggle("a")).await;
    send_json(&mut alice, toggle("b")).await;
    recv_json(&mut alice).await;
    let latest = recv_json(&mut alice).await;

    let bob_token = login_player(&server.addr, "Bob").await;
    let mut bob = connect_room(&server.addr, "r", &bob_token).await;
    let snapshot = recv_json(&mut bob).await;

    assert_eq!(snapshot["type"], "snapshot");
    assert_eq!(snapshot["version"], latest["version"]);
    assert_eq!(snapshot["document"], latest["document"]);
}

#[tokio::test]
async fn test_concurrent_players_see_identical_sequence() {
    const OPS: usize = 10;

    let server = start_server().await;
    let a_token = login_player(&server.addr, "A").await;
    let b_token = login_player(&server.addr, "B").await;
    let mut a = connect_room(&server.addr, "race", &a_token).await;
    let mut b = connect_room(&server.addr, "race", &b_token).await;
    recv_json(&mut a).await;
    recv_json(&mut b).await;

    for i in 0..OPS {
        send_json(&mut a, toggle(&format!("a{i}"))).await;
        send_json(&mut b, toggle(&format!("b{i}"))).await;
    }

    let mut seen_a = Vec::new();
    let mut seen_b = Vec::new();
    for _ in 0..OPS * 2 {
        seen_a.push(recv_json(&mut a).await);
        seen_b.push(recv_json(&mut b).await);
    }

    assert_eq!(seen_a, seen_b);
    let versions: Vec<u64> = seen_a.iter().map(|m| m["version"].as_u64().unwrap()).collect();
    assert_eq!(versions, (1..=(OPS as u64) * 2).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_invalid_operation_rejected_to_sender() {
    let server = start_server().await;
    let token = login_player(&server.addr, "Alice").await;
    let mut ws = connect_room(&server.addr, "r", &token).await;
    recv_json(&mut ws).await;

    send_json(&mut ws, toggle("  ")).await;

    let err = recv_json(&mut ws).await;
    assert_eq!(err["reason"], "invalid_operation");
    assert_eq!(err["message"], "cube_id must not be empty");
}

#[tokio::test]
async fn test_undecodable_frame_keeps_connection_open() {
    let server = start_server().await;
    let token = login_player(&server.addr, "Alice").await;
    let mut ws = connect_room(&server.addr, "r", &token).await;
    recv_json(&mut ws).await;

    ws.send(Message::Text("this is not json".into())).await.unwrap();
    assert_eq!(recv_json(&mut ws).await["reason"], "invalid_message");

    send_json(&mut ws, json!({"type": "operation", "payload": {"action": "explode"}})).await;
    assert_eq!(recv_json(&mut ws).await["reason"], "invalid_message");

    assert_nothing_pending(&mut ws).await;
}

#[tokio::test]
async fn test_state_request_returns_current_snapshot() {
    let server = start_server().await;
    let token = login_player(&server.addr, "Alice").await;
    let mut ws = connect_room(&server.addr, "r", &token).await;
    recv_json(&mut ws).await;
    send_json(&mut ws, toggle("x")).await;
    recv_json(&mut ws).await;

    send_json(&mut ws, json!({"type": "state_request"})).await;

    assert_eq!(
        recv_json(&mut ws).await,
        json!({"type": "snapshot", "document": {"highlighted": ["x"]}, "version": 1})
    );
}

#[tokio::test]
async fn test_logout_closes_every_connection_of_session() {
    let server = start_server().await;
    let token = login_player(&server.addr, "Alice").await;
    let mut first = connect_room(&server.addr, "r", &token).await;
    let mut second = connect_room(&server.addr, "other", &token).await;
    recv_json(&mut first).await;
    recv_json(&mut second).await;

    send_json(&mut first, json!({"type": "logout"})).await;

    assert_eq!(recv_close(&mut first).await, close_code::LOGGED_OUT);
    assert_eq!(recv_close(&mut second).await, close_code::LOGGED_OUT);

    let mut retry = connect_room(&server.addr, "r", &token).await;
    assert_eq!(recv_json(&mut retry).await["reason"], "not_found");
    assert_eq!(recv_close(&mut retry).await, close_code::AUTH_FAILED);
}

#[tokio::test]
async fn test_auth_logout_closes_live_connection() {
    let server = start_server().await;
    let token = login_player(&server.addr, "Alice").await;
    let mut ws = connect_room(&server.addr, "r", &token).await;
    recv_json(&mut ws).await;

    auth_call(&server.addr, json!({"type": "logout", "token": token})).await;

    assert_eq!(recv_close(&mut ws).await, close_code::LOGGED_OUT);
}

#[tokio::test]
async fn test_room_evicted_when_last_member_leaves() {
    let server = start_server().await;
    let token = login_player(&server.addr, "Alice").await;
    let mut ws = connect_room(&server.addr, "r", &token).await;
    recv_json(&mut ws).await;
    send_json(&mut ws, toggle("x")).await;
    recv_json(&mut ws).await;
    assert_eq!(server.rooms.room_count().await, 1);

    ws.close(None).await.unwrap();
    wait_for_room_count(&server.rooms, 0).await;

    let mut again = connect_room(&server.addr, "r", &token).await;
    assert_eq!(
        recv_json(&mut again).await,
        json!({"type": "snapshot", "document": {"highlighted": []}, "version": 0})
    );
}

#[tokio::test]
async fn test_idle_connection_closed_with_4408() {
    let server = start(test_builder().idle_timeout(Some(Duration::from_millis(150)))).await;
    let token = login_player(&server.addr, "Alice").await;
    let mut ws = connect_room(&server.addr, "r", &token).await;
    recv_json(&mut ws).await;

    assert_eq!(recv_close(&mut ws).await, close_code::TIMEOUT);
    wait_for_room_count(&server.rooms, 0).await;
}
