//! The admin HTTP surface: game state introspection and the lifecycle controls
//! the dashboard drives. All handlers go through the engine actor's inbox, so
//! they serialize with the tick loop like every other input.

use crate::AppState;
use crate::actor::Command;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use protocol::{ApiResult, LaunchRequest, SettingsUpdate};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Liveness probe.
pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn game_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (reply, rx) = oneshot::channel();
    if state.commands.send(Command::GetState { reply }).await.is_err() {
        return engine_gone().into_response();
    }
    match rx.await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(_) => engine_gone().into_response(),
    }
}

pub async fn game_lobby(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (reply, rx) = oneshot::channel();
    if state.commands.send(Command::GetLobby { reply }).await.is_err() {
        return engine_gone().into_response();
    }
    match rx.await {
        Ok(lobby) => Json(lobby).into_response(),
        Err(_) => engine_gone().into_response(),
    }
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(update): Json<SettingsUpdate>,
) -> impl IntoResponse {
    run(state, |reply| Command::UpdateSettings { update, reply }).await
}

pub async fn launch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LaunchRequest>,
) -> impl IntoResponse {
    run(state, |reply| Command::Launch {
        mode: request.mode,
        countdown_seconds: request.countdown_duration,
        reply,
    })
    .await
}

pub async fn proceed(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    run(state, |reply| Command::Proceed { reply }).await
}

pub async fn start_next_round(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    run(state, |reply| Command::StartNextRound { reply }).await
}

pub async fn stop(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    run(state, |reply| Command::Stop { reply }).await
}

pub async fn kick(
    State(state): State<Arc<AppState>>,
    Path(player_id): Path<String>,
) -> impl IntoResponse {
    run(state, |reply| Command::Kick { player_id, reply }).await
}

pub async fn shuffle_teams(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    run(state, |reply| Command::ShuffleTeams { reply }).await
}

pub async fn debug_reset(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    run(state, |reply| Command::Reset { reply }).await
}

/// Sends one command with a reply slot and maps the outcome onto a status code.
async fn run(
    state: Arc<AppState>,
    make: impl FnOnce(oneshot::Sender<ApiResult>) -> Command,
) -> (StatusCode, Json<ApiResult>) {
    let (reply, rx) = oneshot::channel();
    if state.commands.send(make(reply)).await.is_err() {
        return engine_gone();
    }
    match rx.await {
        Ok(result) if result.success => (StatusCode::OK, Json(result)),
        Ok(result) => (StatusCode::BAD_REQUEST, Json(result)),
        Err(_) => engine_gone(),
    }
}

fn engine_gone() -> (StatusCode, Json<ApiResult>) {
    tracing::error!("Engine actor unreachable from the admin surface.");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResult::err("engine unavailable")),
    )
}
