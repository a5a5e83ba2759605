//! Integration tests for the room state machine: transition legality,
//! host-only control, FINISHED terminality.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::json;
use tokio::net::TcpListener;

use readalong_server::config::RoomPolicy;
use readalong_server::state::AppState;
use readalong_server::{auth, bus, db, reward, rooms, routes, ws};

async fn start_test_server() -> (String, AppState) {
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
        policy: RoomPolicy::default(),
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

    (format!("http://{}", addr), state)
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

async fn create_room(client: &reqwest::Client, base: &str, token: &str, capacity: i64) -> String {
    let res = client
        .post(format!("{base}/api/rooms"))
        .bearer_auth(token)
        .json(&json!({ "title": "Chapter one", "capacity": capacity }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    let body: serde_json::Value = res.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

async fn transition(
    client: &reqwest::Client,
    base: &str,
    token: &str,
    room_id: &str,
    op: &str,
) -> reqwest::Response {
    client
        .post(format!("{base}/api/rooms/{room_id}/{op}"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn playback_cycle_and_terminal_finish() {
    let (base, _state) = start_test_server().await;
    let client = reqwest::Client::new();
    let (_host_id, host_token) = register(&client, &base, "host").await;
    let room_id = create_room(&client, &base, &host_token, 4).await;

    // WAITING → PAUSED is illegal
    let res = transition(&client, &base, &host_token, &room_id, "pause").await;
    assert_eq!(res.status(), 409);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_transition");

    // WAITING → PLAYING
    let res = transition(&client, &base, &host_token, &room_id, "start").await;
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "playing");

    // Double start is illegal
    let res = transition(&client, &base, &host_token, &room_id, "start").await;
    assert_eq!(res.status(), 409);

    // PLAYING → PAUSED → PLAYING
    let res = transition(&client, &base, &host_token, &room_id, "pause").await;
    assert_eq!(res.status(), 200);
    let res = transition(&client, &base, &host_token, &room_id, "start").await;
    assert_eq!(res.status(), 200);

    // PLAYING → FINISHED
    let res = transition(&client, &base, &host_token, &room_id, "finish").await;
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "finished");

    // FINISHED is absorbing: nothing leaves it
    for op in ["start", "pause", "finish"] {
        let res = transition(&client, &base, &host_token, &room_id, op).await;
        assert_eq!(res.status(), 409, "transition {op} out of finished must fail");
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["error"], "invalid_transition");
    }

    // Room is retained for history
    let res = client
        .get(format!("{base}/api/rooms/{room_id}"))
        .bearer_auth(&host_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "finished");
}

#[tokio::test]
async fn control_operations_are_host_only() {
    let (base, _state) = start_test_server().await;
    let client = reqwest::Client::new();
    let (_host_id, host_token) = register(&client, &base, "host").await;
    let (_guest_id, guest_token) = register(&client, &base, "guest").await;
    let room_id = create_room(&client, &base, &host_token, 4).await;

    // Even a joined participant may not drive playback
    let res = client
        .post(format!("{base}/api/rooms/{room_id}/join"))
        .bearer_auth(&guest_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    for op in ["start", "pause", "finish"] {
        let res = transition(&client, &base, &guest_token, &room_id, op).await;
        assert_eq!(res.status(), 403, "non-host {op} must be rejected");
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["error"], "not_host");
    }

    // Host still can
    let res = transition(&client, &base, &host_token, &room_id, "start").await;
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn unknown_room_is_not_found() {
    let (base, _state) = start_test_server().await;
    let client = reqwest::Client::new();
    let (_id, token) = register(&client, &base, "host").await;

    let res = transition(&client, &base, &token, "no-such-room", "start").await;
    assert_eq!(res.status(), 404);
}
