mod auth;
mod bus;
mod chat;
mod config;
mod db;
mod error;
mod identity;
mod invites;
mod moderation;
mod participants;
mod reward;
mod rooms;
mod routes;
mod state;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use config::{generate_config_template, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "readalong_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "readalong_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("readalong-server starting");

    let db = db::init_db(&config.data_dir)?;
    let jwt_secret = auth::token::load_or_generate_jwt_secret(&config.data_dir)?;

    let state = state::AppState {
        db,
        jwt_secret,
        connections: ws::new_connection_registry(),
        room_subscriptions: ws::new_room_subscriptions(),
        bus: bus::FanoutBus::new(),
        room_locks: rooms::locks::RoomLocks::new(),
        policy: config.rooms.clone(),
        reward: Arc::new(reward::LogRewardSink),
    };

    // One bus subscriber per process rebroadcasts to local connections
    bus::relay::spawn_relay(state.clone());

    // Grace-period sweep frees seats held by stale disconnects
    participants::sweep::spawn_disconnect_sweep(state.clone());

    let app = routes::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
