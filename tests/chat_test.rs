//! Integration tests for the chat log: append validation, round-trip,
//! cursor pagination consistency, moderation gate.

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

async fn create_room(client: &reqwest::Client, base: &str, token: &str) -> String {
    let res = client
        .post(format!("{base}/api/rooms"))
        .bearer_auth(token)
        .json(&json!({ "title": "Reading together", "capacity": 8 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    let body: serde_json::Value = res.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

async fn send_text(
    client: &reqwest::Client,
    base: &str,
    token: &str,
    room_id: &str,
    content: &str,
) -> reqwest::Response {
    client
        .post(format!("{base}/api/rooms/{room_id}/messages"))
        .bearer_auth(token)
        .json(&json!({ "type": "text", "content": content }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn text_round_trip() {
    let (base, _state) = start_test_server().await;
    let client = reqwest::Client::new();
    let (host, host_token) = register(&client, &base, "host").await;
    let room_id = create_room(&client, &base, &host_token).await;

    let res = send_text(&client, &base, &host_token, &room_id, "first page done!").await;
    assert_eq!(res.status(), 201);
    let sent: serde_json::Value = res.json().await.unwrap();
    let cursor = sent["id"].as_i64().unwrap();

    let res = client
        .get(format!("{base}/api/rooms/{room_id}/messages?limit=1"))
        .bearer_auth(&host_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let page: serde_json::Value = res.json().await.unwrap();
    let messages = page["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["id"].as_i64().unwrap(), cursor);
    assert_eq!(messages[0]["content"], "first page done!");
    assert_eq!(messages[0]["sender_id"].as_str().unwrap(), host);
    assert_eq!(messages[0]["room_id"].as_str().unwrap(), room_id);
}

#[tokio::test]
async fn payload_is_mutually_exclusive() {
    let (base, _state) = start_test_server().await;
    let client = reqwest::Client::new();
    let (_h, host_token) = register(&client, &base, "host").await;
    let room_id = create_room(&client, &base, &host_token).await;

    // text without content
    let res = client
        .post(format!("{base}/api/rooms/{room_id}/messages"))
        .bearer_auth(&host_token)
        .json(&json!({ "type": "text" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    // text with an image_ref
    let res = client
        .post(format!("{base}/api/rooms/{room_id}/messages"))
        .bearer_auth(&host_token)
        .json(&json!({ "type": "text", "content": "hi", "image_ref": "s3://x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    // image with content instead of image_ref
    let res = client
        .post(format!("{base}/api/rooms/{room_id}/messages"))
        .bearer_auth(&host_token)
        .json(&json!({ "type": "image", "content": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    // valid image message
    let res = client
        .post(format!("{base}/api/rooms/{room_id}/messages"))
        .bearer_auth(&host_token)
        .json(&json!({ "type": "image", "image_ref": "https://cdn.example/p1.png" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
}

#[tokio::test]
async fn non_participant_cannot_chat() {
    let (base, _state) = start_test_server().await;
    let client = reqwest::Client::new();
    let (_h, host_token) = register(&client, &base, "host").await;
    let (_s, stranger_token) = register(&client, &base, "stranger").await;
    let room_id = create_room(&client, &base, &host_token).await;

    let res = send_text(&client, &base, &stranger_token, &room_id, "hello?").await;
    assert_eq!(res.status(), 403);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_participant");
}

/// Paging before(cursor) repeatedly and concatenating yields the same total
/// order as one large recent() call, with no gaps or duplicates.
#[tokio::test]
async fn backward_pagination_is_consistent() {
    let (base, _state) = start_test_server().await;
    let client = reqwest::Client::new();
    let (_h, host_token) = register(&client, &base, "host").await;
    let room_id = create_room(&client, &base, &host_token).await;

    for i in 0..7 {
        let res = send_text(&client, &base, &host_token, &room_id, &format!("msg {i}")).await;
        assert_eq!(res.status(), 201);
    }

    // One big page
    let res = client
        .get(format!("{base}/api/rooms/{room_id}/messages?limit=50"))
        .bearer_auth(&host_token)
        .send()
        .await
        .unwrap();
    let page: serde_json::Value = res.json().await.unwrap();
    let full: Vec<i64> = page["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_i64().unwrap())
        .collect();
    assert_eq!(full.len(), 7);
    assert!(full.windows(2).all(|w| w[0] > w[1]), "descending id order");
    assert!(!page["has_more"].as_bool().unwrap());

    // Walk backward two at a time
    let mut collected: Vec<i64> = Vec::new();
    let mut before: Option<i64> = None;
    loop {
        let url = match before {
            Some(cursor) => {
                format!("{base}/api/rooms/{room_id}/messages?limit=2&before={cursor}")
            }
            None => format!("{base}/api/rooms/{room_id}/messages?limit=2"),
        };
        let page: serde_json::Value = client
            .get(url)
            .bearer_auth(&host_token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let ids: Vec<i64> = page["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["id"].as_i64().unwrap())
            .collect();
        if ids.is_empty() {
            break;
        }
        before = ids.last().copied();
        collected.extend(ids);
        if !page["has_more"].as_bool().unwrap() {
            break;
        }
    }
    assert_eq!(collected, full);
}

#[tokio::test]
async fn chat_in_finished_room_is_rejected_and_not_persisted() {
    let (base, _state) = start_test_server().await;
    let client = reqwest::Client::new();
    let (_h, host_token) = register(&client, &base, "host").await;
    let room_id = create_room(&client, &base, &host_token).await;

    send_text(&client, &base, &host_token, &room_id, "closing soon").await;

    let res = client
        .post(format!("{base}/api/rooms/{room_id}/finish"))
        .bearer_auth(&host_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let res = send_text(&client, &base, &host_token, &room_id, "too late").await;
    assert_eq!(res.status(), 409);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "room_not_joinable");

    // History is exactly the one pre-finish message
    let res = client
        .get(format!("{base}/api/rooms/{room_id}/messages"))
        .bearer_auth(&host_token)
        .send()
        .await
        .unwrap();
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["messages"].as_array().unwrap().len(), 1);
}

/// The moderation gate vetoes chat from banned users. The first registered
/// user holds the admin flag.
#[tokio::test]
async fn banned_user_cannot_chat() {
    let (base, _state) = start_test_server().await;
    let client = reqwest::Client::new();
    let (_admin, admin_token) = register(&client, &base, "admin").await;
    let (troll, troll_token) = register(&client, &base, "troll").await;
    let room_id = create_room(&client, &base, &admin_token).await;

    let res = client
        .post(format!("{base}/api/rooms/{room_id}/join"))
        .bearer_auth(&troll_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let res = client
        .post(format!("{base}/api/moderation/ban"))
        .bearer_auth(&admin_token)
        .json(&json!({ "user_id": troll, "reason": "spoilers" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let res = send_text(&client, &base, &troll_token, &room_id, "chapter 12 ending:").await;
    assert_eq!(res.status(), 403);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "banned_user");
}
