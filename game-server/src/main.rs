mod actor;
mod admin;
mod settings_store;
mod ws;

use crate::actor::{Command, EngineActor};
use axum::Router;
use axum::routing::{get, post};
use game_engine::Engine;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::sync::mpsc;
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shared handle every HTTP and websocket handler works through.
pub struct AppState {
    pub commands: mpsc::Sender<Command>,
    pub next_conn_id: AtomicU64,
}

#[tokio::main]
/// Activates error tracing, loads the persisted settings, spawns the engine
/// actor, then sets up the routing for the websocket endpoint, the admin
/// surface and the static web views. The server listens on port 8080.
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let settings = settings_store::load(settings_store::DEFAULT_SETTINGS_PATH).await;
    tracing::info!(mode = settings.game_mode.as_str(), "Settings loaded.");

    let engine = Engine::new(settings);
    let commands = EngineActor::spawn(engine, settings_store::DEFAULT_SETTINGS_PATH.to_string());
    let app_state = Arc::new(AppState { commands, next_conn_id: AtomicU64::new(1) });

    let app = Router::new()
        .route("/ws", get(ws::websocket_handler))
        .route("/healthz", get(admin::healthz))
        .route("/game/state", get(admin::game_state))
        .route("/game/lobby", get(admin::game_lobby))
        .route("/game/settings", post(admin::update_settings))
        .route("/game/launch", post(admin::launch))
        .route("/game/proceed", post(admin::proceed))
        .route("/game/start-next-round", post(admin::start_next_round))
        .route("/game/stop", post(admin::stop))
        .route("/game/kick/{player_id}", post(admin::kick))
        .route("/game/shuffle-teams", post(admin::shuffle_teams))
        .route("/debug/reset", post(admin::debug_reset))
        .with_state(app_state)
        .fallback_service(ServeDir::new("public").not_found_service(ServeFile::new("public/index.html")));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
        .await
        .expect("port 8080 must be free");

    axum::serve(listener, app).await.expect("server loop failed");
}
