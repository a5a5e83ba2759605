//! Integration tests for the session gateway: auth close codes, room
//! subscription, chat fanout, forced disconnect, and the grace sweep.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use readalong_server::config::RoomPolicy;
use readalong_server::participants::sweep;
use readalong_server::state::AppState;
use readalong_server::{auth, bus, db, reward, rooms, routes, ws};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn start_test_server(policy: RoomPolicy) -> (String, SocketAddr, AppState) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret =
        auth::token::load_or_generate_jwt_secret(&data_dir).expect("Failed to generate JWT secret");

    let state = AppState {
        db,
        jwt_secret,
        connections: ws::new_connection_registry(),
        room_subscriptions: ws::new_room_subscriptions(),
        bus: bus::FanoutBus::new(),
        room_locks: rooms::locks::RoomLocks::new(),
        policy,
        reward: Arc::new(reward::LogRewardSink),
    };

    bus::relay::spawn_relay(state.clone());

    let app = routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    (format!("http://{}", addr), addr, state)
}

async fn register(client: &reqwest::Client, base: &str, name: &str) -> (String, String) {
    let res = client
        .post(format!("{base}/api/identity/register"))
        .json(&json!({ "display_name": name }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    let body: serde_json::Value = res.json().await.unwrap();
    (
        body["user_id"].as_str().unwrap().to_string(),
        body["token"].as_str().unwrap().to_string(),
    )
}

async fn create_room(client: &reqwest::Client, base: &str, token: &str) -> String {
    let res = client
        .post(format!("{base}/api/rooms"))
        .bearer_auth(token)
        .json(&json!({ "title": "Evening read", "capacity": 8 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    let body: serde_json::Value = res.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

async fn connect_ws(addr: SocketAddr, token: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token={token}"))
        .await
        .expect("ws connect failed");
    stream
}

/// Read frames until one with the given `event` name arrives; panics after
/// the deadline. Other frames (acks, unrelated events) are skipped.
async fn read_until_event(stream: &mut WsStream, event: &str) -> serde_json::Value {
    let deadline = Duration::from_secs(3);
    loop {
        let msg = tokio::time::timeout(deadline, stream.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for event {event}"))
            .expect("stream ended")
            .expect("ws error");
        if let Message::Text(text) = msg {
            let frame: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            if frame["event"] == event {
                return frame;
            }
        }
    }
}

async fn subscribe(stream: &mut WsStream, room_id: &str) {
    stream
        .send(Message::Text(
            json!({ "type": "subscribe", "room_id": room_id })
                .to_string()
                .into(),
        ))
        .await
        .unwrap();
    let ack = read_until_event(stream, "subscribed").await;
    assert_eq!(ack["data"]["room_id"].as_str().unwrap(), room_id);
}

#[tokio::test]
async fn invalid_token_is_closed_with_4002() {
    let (_base, addr, _state) = start_test_server(RoomPolicy::default()).await;

    let mut stream = connect_ws(addr, "garbage").await;
    loop {
        match tokio::time::timeout(Duration::from_secs(3), stream.next())
            .await
            .expect("timed out waiting for close")
        {
            Some(Ok(Message::Close(Some(frame)))) => {
                assert_eq!(u16::from(frame.code), 4002);
                break;
            }
            Some(Ok(_)) => continue,
            other => panic!("expected close frame, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn subscribe_requires_membership() {
    let (base, addr, _state) = start_test_server(RoomPolicy::default()).await;
    let client = reqwest::Client::new();
    let (_h, host_token) = register(&client, &base, "host").await;
    let (_s, stranger_token) = register(&client, &base, "stranger").await;
    let room_id = create_room(&client, &base, &host_token).await;

    let mut stream = connect_ws(addr, &stranger_token).await;
    stream
        .send(Message::Text(
            json!({ "type": "subscribe", "room_id": room_id })
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

    let err = read_until_event(&mut stream, "error").await;
    assert_eq!(err["data"]["code"].as_str().unwrap(), "not_participant");
}

/// A chat sent over one connection fans out to every subscriber of the room
/// topic, including the sender.
#[tokio::test]
async fn chat_fans_out_to_room_subscribers() {
    let (base, addr, _state) = start_test_server(RoomPolicy::default()).await;
    let client = reqwest::Client::new();
    let (_h, host_token) = register(&client, &base, "host").await;
    let (guest_id, guest_token) = register(&client, &base, "guest").await;
    let room_id = create_room(&client, &base, &host_token).await;

    let res = client
        .post(format!("{base}/api/rooms/{room_id}/join"))
        .bearer_auth(&guest_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let mut host_ws = connect_ws(addr, &host_token).await;
    let mut guest_ws = connect_ws(addr, &guest_token).await;
    subscribe(&mut host_ws, &room_id).await;
    subscribe(&mut guest_ws, &room_id).await;

    guest_ws
        .send(Message::Text(
            json!({ "type": "chat", "room_id": room_id, "content": "made it to ch. 3" })
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

    for stream in [&mut host_ws, &mut guest_ws] {
        let frame = read_until_event(stream, "message_created").await;
        assert_eq!(frame["data"]["content"], "made it to ch. 3");
        assert_eq!(frame["data"]["sender_id"].as_str().unwrap(), guest_id);
        assert!(frame["data"]["id"].as_i64().unwrap() > 0);
    }
}

/// Room-state transitions are broadcast on the room topic.
#[tokio::test]
async fn state_changes_are_broadcast() {
    let (base, addr, _state) = start_test_server(RoomPolicy::default()).await;
    let client = reqwest::Client::new();
    let (_h, host_token) = register(&client, &base, "host").await;
    let room_id = create_room(&client, &base, &host_token).await;

    let mut host_ws = connect_ws(addr, &host_token).await;
    subscribe(&mut host_ws, &room_id).await;

    let res = client
        .post(format!("{base}/api/rooms/{room_id}/start"))
        .bearer_auth(&host_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let frame = read_until_event(&mut host_ws, "room_state_changed").await;
    assert_eq!(frame["data"]["status"], "playing");

    let res = client
        .post(format!("{base}/api/rooms/{room_id}/finish"))
        .bearer_auth(&host_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let frame = read_until_event(&mut host_ws, "room_finished").await;
    let participant_ids = frame["data"]["participant_ids"].as_array().unwrap();
    assert_eq!(participant_ids.len(), 1, "host was the only active participant");
}

/// Kicking a participant terminates their live connection with close 4004.
#[tokio::test]
async fn kick_force_closes_target_connection() {
    let (base, addr, _state) = start_test_server(RoomPolicy::default()).await;
    let client = reqwest::Client::new();
    let (_h, host_token) = register(&client, &base, "host").await;
    let (guest_id, guest_token) = register(&client, &base, "guest").await;
    let room_id = create_room(&client, &base, &host_token).await;

    client
        .post(format!("{base}/api/rooms/{room_id}/join"))
        .bearer_auth(&guest_token)
        .send()
        .await
        .unwrap();

    let mut guest_ws = connect_ws(addr, &guest_token).await;
    subscribe(&mut guest_ws, &room_id).await;

    let res = client
        .post(format!("{base}/api/rooms/{room_id}/kick"))
        .bearer_auth(&host_token)
        .json(&json!({ "user_id": guest_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    // The guest sees the forced-disconnect control event and then the close
    let mut saw_close = false;
    let deadline = Duration::from_secs(3);
    loop {
        match tokio::time::timeout(deadline, guest_ws.next())
            .await
            .expect("timed out waiting for close")
        {
            Some(Ok(Message::Close(Some(frame)))) => {
                assert_eq!(u16::from(frame.code), 4004);
                saw_close = true;
                break;
            }
            Some(Ok(_)) => continue,
            None => break,
            Some(Err(e)) => panic!("ws error: {e}"),
        }
    }
    assert!(saw_close);
}

/// A dropped connection marks the seat DISCONNECTED (still occupied); the
/// grace sweep then frees it.
#[tokio::test]
async fn disconnect_sweep_frees_stale_seats() {
    let policy = RoomPolicy {
        disconnect_grace_secs: 0,
        ..RoomPolicy::default()
    };
    let (base, addr, state) = start_test_server(policy).await;
    let client = reqwest::Client::new();
    let (_h, host_token) = register(&client, &base, "host").await;
    let (guest_id, guest_token) = register(&client, &base, "guest").await;
    let room_id = create_room(&client, &base, &host_token).await;

    client
        .post(format!("{base}/api/rooms/{room_id}/join"))
        .bearer_auth(&guest_token)
        .send()
        .await
        .unwrap();

    let mut guest_ws = connect_ws(addr, &guest_token).await;
    subscribe(&mut guest_ws, &room_id).await;

    // Drop the socket: the actor marks the guest DISCONNECTED on its way out
    drop(guest_ws);

    // With a zero grace period the next sweep pass exits the guest; poll a
    // few times while the actor finishes its cleanup.
    let mut exited = 0;
    for _ in 0..20 {
        exited = sweep::run_sweep(&state).await.expect("sweep failed");
        if exited > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(exited, 1);

    let res = client
        .get(format!("{base}/api/rooms/{room_id}/participants"))
        .bearer_auth(&host_token)
        .send()
        .await
        .unwrap();
    let list: serde_json::Value = res.json().await.unwrap();
    let ids: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["user_id"].as_str().unwrap())
        .collect();
    assert!(!ids.contains(&guest_id.as_str()));
}
