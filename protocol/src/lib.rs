//! The wire messages that we use. They are used consistent across the server and all
//! connected views (player phones, base phones, dashboard).
//!
//! Every websocket frame carries exactly one logical message, encoded as a JSON
//! envelope `{"event": "...", "data": {...}}`. The same payload structs double as the
//! bodies of the admin HTTP surface where the shapes overlap (e.g. the game snapshot).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The buffer sizes for the channels for intra server communication.
pub const CHANNEL_BUFFER_SIZE: usize = 256;

/// The lifecycle phase of the engine as visible to clients.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum GamePhase {
    #[serde(rename = "waiting")]
    Waiting,
    #[serde(rename = "pre-game")]
    PreGame,
    #[serde(rename = "countdown")]
    Countdown,
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "round-ended")]
    RoundEnded,
    #[serde(rename = "finished")]
    Finished,
}

// Client -> Server.

/// Everything a client may send to the server. One envelope per frame.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    /// Join the lobby. Allocates a player number and a session token.
    #[serde(rename = "player:join")]
    PlayerJoin {
        #[serde(rename = "playerId")]
        player_id: String,
        name: String,
    },
    /// Rebind a previous session to this socket. Answered with a snapshot.
    #[serde(rename = "player:reconnect")]
    PlayerReconnect { token: String },
    /// One accelerometer sample. Units: 10 per axis is the device maximum.
    #[serde(rename = "player:move")]
    PlayerMove {
        #[serde(rename = "playerId")]
        player_id: String,
        x: f64,
        y: f64,
        z: f64,
        timestamp: u64,
    },
    /// Phase dependent ready toggle (pre-game, round-ended, finished).
    #[serde(rename = "player:ready")]
    PlayerReady {
        #[serde(rename = "playerId")]
        player_id: String,
    },
    /// Use the role ability. The result goes back to the sender only.
    #[serde(rename = "player:tap")]
    PlayerTap {
        #[serde(rename = "playerId")]
        player_id: String,
    },
    /// Cycle the calling player's team. Only honored in waiting/pre-game.
    #[serde(rename = "team:switch")]
    TeamSwitch,
    /// Register a base phone. A known `baseId` reconnects to that base.
    #[serde(rename = "base:register")]
    BaseRegister {
        #[serde(rename = "baseId")]
        base_id: Option<String>,
    },
    /// Cycle the ownership of a base. Only honored while a round is active.
    #[serde(rename = "base:tap")]
    BaseTap {
        #[serde(rename = "baseId")]
        base_id: String,
    },
    /// Keepalive.
    #[serde(rename = "ping")]
    Ping,
}

// Server -> Client.

/// A single status effect as shown to clients.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EffectSnapshot {
    #[serde(rename = "type")]
    pub effect_type: String,
    /// Game time in ms when the effect runs out, none for indefinite effects.
    pub end_time: Option<u64>,
}

/// The per player slice of the authoritative tick snapshot.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: String,
    pub name: String,
    pub number: u32,
    pub is_alive: bool,
    pub accumulated_damage: f64,
    pub points: u32,
    pub total_points: u32,
    pub toughness: f64,
    pub death_count: u32,
    pub team_id: Option<u32>,
    pub is_disconnected: bool,
    /// Remaining disconnect grace in ms, none while connected.
    pub grace_time_remaining: Option<u64>,
    pub status_effects: Vec<EffectSnapshot>,
}

/// The authoritative per tick snapshot that is fanned out while a round runs.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GameTickPayload {
    pub game_time: u64,
    /// Only set for modes with a fixed round duration.
    pub round_time_remaining: Option<u64>,
    pub players: Vec<PlayerSnapshot>,
}

/// One row of the lobby listing.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LobbyPlayer {
    pub id: String,
    pub number: u32,
    pub name: String,
    pub is_connected: bool,
    pub is_ready: bool,
    pub team_id: Option<u32>,
}

/// One row of a ranked score listing (round end and game end).
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub player_id: String,
    pub name: String,
    pub number: u32,
    pub points: u32,
    pub total_points: u32,
    /// Ties share the lower rank: 1,1,3,4.
    pub rank: u32,
}

/// Team match points keyed for display.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TeamScoreEntry {
    pub team_id: u32,
    pub team_name: String,
    pub team_color: String,
    pub score: u32,
}

/// The role briefing a player receives at round start.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RoleInfo {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub difficulty: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_number: Option<u32>,
}

/// Charge counters returned with every ability use.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChargeInfo {
    pub current: u32,
    pub max: u32,
    pub cooldown_remaining: u64,
}

/// Payload of the mode event announcement (currently only speed shift).
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ModeEventData {
    pub phase: String,
    pub danger_threshold: f64,
}

/// One row of the base status listing in Domination.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BaseStatusEntry {
    pub base_id: String,
    pub base_number: u32,
    pub owner_team_id: Option<u32>,
    /// Progress towards the next control point in [0,1].
    pub control_progress: f64,
    pub is_connected: bool,
}

/// Everything the server may send to clients. Broadcast unless noted targeted.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    /// Targeted join acknowledgement. On failure only `success` and `error` are set.
    #[serde(rename = "player:joined")]
    #[serde(rename_all = "camelCase")]
    PlayerJoined {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        player_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        socket_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_token: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        player_number: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        team_id: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Targeted reconnect acknowledgement carrying the game snapshot.
    #[serde(rename = "player:reconnected")]
    #[serde(rename_all = "camelCase")]
    PlayerReconnected {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        player_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        player_number: Option<u32>,
        player: Option<PlayerSnapshot>,
        game_state: GamePhase,
        current_round: u32,
        total_rounds: u32,
        mode: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename = "lobby:update")]
    LobbyUpdate { players: Vec<LobbyPlayer> },
    /// Mapping from player id to team id for every teamed player.
    #[serde(rename = "team:update")]
    TeamUpdate { teams: BTreeMap<String, u32> },
    #[serde(rename = "game:start")]
    #[serde(rename_all = "camelCase")]
    GameStart {
        mode: String,
        total_rounds: u32,
        sensitivity: String,
    },
    /// `phase` is "countdown" for the second announcements and "go" for the start.
    #[serde(rename = "game:countdown")]
    #[serde(rename_all = "camelCase")]
    GameCountdown { phase: String, seconds_remaining: u32 },
    #[serde(rename = "round:start")]
    #[serde(rename_all = "camelCase")]
    RoundStart {
        round_number: u32,
        total_rounds: u32,
        game_time: u64,
    },
    #[serde(rename = "game:tick")]
    GameTick(GameTickPayload),
    #[serde(rename = "player:death")]
    #[serde(rename_all = "camelCase")]
    PlayerDeath {
        victim_id: String,
        victim_name: String,
        victim_number: u32,
        game_time: u64,
    },
    #[serde(rename = "player:respawn")]
    #[serde(rename_all = "camelCase")]
    PlayerRespawn {
        player_id: String,
        player_name: String,
        player_number: u32,
        game_time: u64,
    },
    /// Targeted to the dying player, `respawn_in` in ms.
    #[serde(rename = "player:respawn-pending")]
    #[serde(rename_all = "camelCase")]
    PlayerRespawnPending { respawn_in: u64 },
    /// Targeted damage burst summary.
    #[serde(rename = "player:damage")]
    #[serde(rename_all = "camelCase")]
    PlayerDamage { total_damage: f64 },
    /// Targeted role briefing, once per player per round start.
    #[serde(rename = "role:assigned")]
    RoleAssigned(RoleInfo),
    /// Targeted role change mid round (e.g. a resolved target).
    #[serde(rename = "role:updated")]
    RoleUpdated(RoleInfo),
    /// Targeted ability result.
    #[serde(rename = "player:tap:result")]
    PlayerTapResult {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        charges: Option<ChargeInfo>,
    },
    #[serde(rename = "ready:update")]
    ReadyUpdate { ready: u32, total: u32 },
    #[serde(rename = "ready:enabled")]
    ReadyEnabled { enabled: bool },
    #[serde(rename = "round:end")]
    #[serde(rename_all = "camelCase")]
    RoundEnd {
        round_number: u32,
        scores: Vec<ScoreEntry>,
        game_time: u64,
        winner_id: Option<String>,
        team_scores: Option<Vec<TeamScoreEntry>>,
    },
    #[serde(rename = "game:end")]
    #[serde(rename_all = "camelCase")]
    GameEnd {
        winner: Option<String>,
        scores: Vec<ScoreEntry>,
        total_rounds: u32,
        team_scores: Option<Vec<TeamScoreEntry>>,
    },
    #[serde(rename = "game:stopped")]
    GameStopped {},
    #[serde(rename = "mode:event")]
    #[serde(rename_all = "camelCase")]
    ModeEvent {
        mode_name: String,
        event_type: String,
        data: ModeEventData,
    },
    /// Targeted acknowledgement for a base phone.
    #[serde(rename = "base:registered")]
    #[serde(rename_all = "camelCase")]
    BaseRegistered {
        base_id: String,
        base_number: u32,
        owner_team_id: Option<u32>,
        game_state: GamePhase,
    },
    #[serde(rename = "base:captured")]
    #[serde(rename_all = "camelCase")]
    BaseCaptured {
        base_id: String,
        base_number: u32,
        team_id: u32,
        team_name: String,
        team_color: String,
    },
    #[serde(rename = "base:point")]
    #[serde(rename_all = "camelCase")]
    BasePoint {
        base_id: String,
        base_number: u32,
        team_id: u32,
        team_scores: Vec<TeamScoreEntry>,
    },
    #[serde(rename = "base:status")]
    BaseStatus { bases: Vec<BaseStatusEntry> },
    #[serde(rename = "domination:win")]
    #[serde(rename_all = "camelCase")]
    DominationWin {
        winning_team_id: u32,
        winning_team_name: String,
        team_scores: Vec<TeamScoreEntry>,
    },
    #[serde(rename = "vampire:bloodlust")]
    #[serde(rename_all = "camelCase")]
    VampireBloodlust {
        vampire_id: String,
        vampire_name: String,
        vampire_number: u32,
        active: bool,
    },
}

// Admin HTTP surface.

/// Body of `POST /game/settings`. Absent fields stay untouched, out of range
/// numeric values are clamped by the engine.
#[derive(Serialize, Deserialize, Clone, Default, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub sensitivity: Option<String>,
    pub game_mode: Option<String>,
    pub theme: Option<String>,
    pub round_count: Option<u32>,
    /// Seconds.
    pub round_duration: Option<u32>,
    pub teams_enabled: Option<bool>,
    pub team_count: Option<u32>,
    pub domination_point_target: Option<u32>,
    /// Seconds.
    pub domination_control_interval: Option<u32>,
    /// Seconds.
    pub domination_respawn_time: Option<u32>,
    pub domination_base_count: Option<u32>,
}

/// Body of `POST /game/launch`.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRequest {
    pub mode: String,
    /// Seconds, defaults to the configured countdown.
    pub countdown_duration: Option<u32>,
}

/// The uniform admin acknowledgement.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ApiResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResult {
    pub fn ok() -> Self {
        ApiResult { success: true, error: None }
    }

    pub fn err(message: impl Into<String>) -> Self {
        ApiResult { success: false, error: Some(message.into()) }
    }
}

/// Response of `GET /game/state`: the tick snapshot plus mode and round info.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GameStateResponse {
    pub game_state: GamePhase,
    pub mode: Option<String>,
    pub current_round: u32,
    pub total_rounds: u32,
    #[serde(flatten)]
    pub snapshot: GameTickPayload,
}
