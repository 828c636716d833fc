//! The engine actor: one task owns the whole game state. Inbound websocket
//! messages and admin commands arrive through a bounded inbox, the tick and
//! housekeeping intervals live in the same select loop, so message handling and
//! tick execution are mutually excluded by construction. After every step the
//! outbound queue is drained and fanned out over the live connections.

use game_engine::{AccelSample, Engine, Outbound};
use protocol::{
    ApiResult, CHANNEL_BUFFER_SIZE, ClientMessage, GameStateResponse, LobbyPlayer, ServerMessage,
    SettingsUpdate,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

/// What a connection has identified itself as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientKind {
    /// Not yet identified; receives broadcasts only (dashboards do this).
    Watcher,
    Player { player_id: String },
    Base { base_id: String },
}

/// Everything that can be sent into the actor's inbox.
pub enum Command {
    Attach { conn_id: u64, sender: mpsc::Sender<ServerMessage> },
    Detach { conn_id: u64 },
    Message { conn_id: u64, message: ClientMessage },
    UpdateSettings { update: SettingsUpdate, reply: oneshot::Sender<ApiResult> },
    Launch { mode: String, countdown_seconds: Option<u32>, reply: oneshot::Sender<ApiResult> },
    Proceed { reply: oneshot::Sender<ApiResult> },
    StartNextRound { reply: oneshot::Sender<ApiResult> },
    Stop { reply: oneshot::Sender<ApiResult> },
    Kick { player_id: String, reply: oneshot::Sender<ApiResult> },
    ShuffleTeams { reply: oneshot::Sender<ApiResult> },
    Reset { reply: oneshot::Sender<ApiResult> },
    GetState { reply: oneshot::Sender<GameStateResponse> },
    GetLobby { reply: oneshot::Sender<Vec<LobbyPlayer>> },
}

struct Connection {
    sender: mpsc::Sender<ServerMessage>,
    kind: ClientKind,
}

pub struct EngineActor {
    engine: Engine,
    connections: HashMap<u64, Connection>,
    settings_path: String,
    started: Instant,
}

impl EngineActor {
    /// Spawns the actor task and returns the inbox handle.
    pub fn spawn(engine: Engine, settings_path: String) -> mpsc::Sender<Command> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let actor = EngineActor {
            engine,
            connections: HashMap::new(),
            settings_path,
            started: Instant::now(),
        };
        tokio::spawn(actor.run(rx));
        tx
    }

    fn wall_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    async fn run(mut self, mut inbox: mpsc::Receiver<Command>) {
        let mut tick_period = self.engine.tick_rate_ms().max(1);
        let mut ticker = tokio::time::interval(Duration::from_millis(tick_period));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut housekeeping = tokio::time::interval(Duration::from_millis(500));

        loop {
            tokio::select! {
                command = inbox.recv() => {
                    let Some(command) = command else {
                        tracing::info!("Actor inbox closed, shutting down engine.");
                        break;
                    };
                    self.handle_command(command);
                }
                _ = ticker.tick() => {
                    if self.engine.wants_ticks() {
                        let wall = self.wall_ms();
                        let dt = self.engine.tick_rate_ms();
                        self.engine.advance(dt, wall);
                    }
                }
                _ = housekeeping.tick() => {
                    let wall = self.wall_ms();
                    self.engine.housekeeping(wall);
                }
            }

            // A settings change may retune the tick rate.
            if self.engine.tick_rate_ms().max(1) != tick_period {
                tick_period = self.engine.tick_rate_ms().max(1);
                ticker = tokio::time::interval(Duration::from_millis(tick_period));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            }

            self.flush_outbound();
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Attach { conn_id, sender } => {
                self.connections
                    .insert(conn_id, Connection { sender, kind: ClientKind::Watcher });
            }
            Command::Detach { conn_id } => {
                let Some(connection) = self.connections.remove(&conn_id) else {
                    return;
                };
                match connection.kind {
                    ClientKind::Player { player_id } => {
                        let wall = self.wall_ms();
                        self.engine.handle_disconnect(&player_id, wall);
                    }
                    ClientKind::Base { base_id } => {
                        self.engine.handle_base_disconnect(&base_id);
                    }
                    ClientKind::Watcher => {}
                }
            }
            Command::Message { conn_id, message } => self.handle_client_message(conn_id, message),
            Command::UpdateSettings { update, reply } => {
                self.engine.update_settings(&update);
                self.persist_settings();
                let _ = reply.send(ApiResult::ok());
            }
            Command::Launch { mode, countdown_seconds, reply } => {
                let result = self.engine.launch(&mode, countdown_seconds);
                let _ = reply.send(to_api_result(result));
            }
            Command::Proceed { reply } => {
                let _ = reply.send(to_api_result(self.engine.proceed()));
            }
            Command::StartNextRound { reply } => {
                let _ = reply.send(to_api_result(self.engine.start_next_round()));
            }
            Command::Stop { reply } => {
                self.engine.stop();
                let _ = reply.send(ApiResult::ok());
            }
            Command::Kick { player_id, reply } => {
                let _ = reply.send(to_api_result(self.engine.kick(&player_id)));
            }
            Command::ShuffleTeams { reply } => {
                let _ = reply.send(to_api_result(self.engine.shuffle_teams()));
            }
            Command::Reset { reply } => {
                self.engine.reset();
                let _ = reply.send(ApiResult::ok());
            }
            Command::GetState { reply } => {
                let _ = reply.send(self.engine.state_response());
            }
            Command::GetLobby { reply } => {
                let _ = reply.send(self.engine.lobby_players());
            }
        }
    }

    fn handle_client_message(&mut self, conn_id: u64, message: ClientMessage) {
        let wall = self.wall_ms();
        match message {
            ClientMessage::PlayerJoin { player_id, name } => {
                match self.engine.handle_join(&player_id, &name, wall) {
                    Ok(ack) => {
                        self.identify(conn_id, ClientKind::Player { player_id: ack.player_id.clone() });
                        self.send_to_conn(conn_id, ServerMessage::PlayerJoined {
                            success: true,
                            player_id: Some(ack.player_id),
                            socket_id: Some(conn_id.to_string()),
                            session_token: Some(ack.session_token),
                            player_number: Some(ack.player_number),
                            name: Some(ack.name),
                            team_id: ack.team_id,
                            error: None,
                        });
                    }
                    Err(rejection) => {
                        self.send_to_conn(conn_id, ServerMessage::PlayerJoined {
                            success: false,
                            player_id: None,
                            socket_id: None,
                            session_token: None,
                            player_number: None,
                            name: None,
                            team_id: None,
                            error: Some(rejection.to_string()),
                        });
                    }
                }
            }
            ClientMessage::PlayerReconnect { token } => {
                match self.engine.handle_reconnect(&token, wall) {
                    Ok(ack) => {
                        self.identify(conn_id, ClientKind::Player { player_id: ack.player_id.clone() });
                        self.send_to_conn(conn_id, ServerMessage::PlayerReconnected {
                            success: true,
                            player_id: Some(ack.player_id),
                            player_number: Some(ack.player_number),
                            player: ack.player,
                            game_state: ack.game_state,
                            current_round: ack.current_round,
                            total_rounds: ack.total_rounds,
                            mode: ack.mode,
                            error: None,
                        });
                    }
                    Err(rejection) => {
                        let state = self.engine.state_response();
                        self.send_to_conn(conn_id, ServerMessage::PlayerReconnected {
                            success: false,
                            player_id: None,
                            player_number: None,
                            player: None,
                            game_state: state.game_state,
                            current_round: state.current_round,
                            total_rounds: state.total_rounds,
                            mode: state.mode,
                            error: Some(rejection.to_string()),
                        });
                    }
                }
            }
            ClientMessage::PlayerMove { player_id, x, y, z, timestamp } => {
                self.engine
                    .handle_move(&player_id, AccelSample { x, y, z, timestamp });
            }
            ClientMessage::PlayerReady { player_id } => {
                if let Err(rejection) = self.engine.handle_ready(&player_id, wall) {
                    tracing::debug!(player = player_id.as_str(), code = rejection.code(), "Ready rejected.");
                }
            }
            ClientMessage::PlayerTap { player_id } => {
                self.engine.handle_tap(&player_id);
            }
            ClientMessage::TeamSwitch => {
                let Some(ClientKind::Player { player_id }) =
                    self.connections.get(&conn_id).map(|c| c.kind.clone())
                else {
                    tracing::debug!(conn_id, "Team switch from an unidentified connection.");
                    return;
                };
                if let Err(rejection) = self.engine.handle_team_switch(&player_id) {
                    tracing::debug!(player = player_id.as_str(), code = rejection.code(), "Team switch rejected.");
                }
            }
            ClientMessage::BaseRegister { base_id } => {
                match self.engine.handle_base_register(base_id) {
                    Ok(ack) => {
                        self.identify(conn_id, ClientKind::Base { base_id: ack.base_id.clone() });
                        self.send_to_conn(conn_id, ServerMessage::BaseRegistered {
                            base_id: ack.base_id,
                            base_number: ack.base_number,
                            owner_team_id: ack.owner_team_id,
                            game_state: ack.game_state,
                        });
                    }
                    Err(rejection) => {
                        tracing::warn!(code = rejection.code(), "Base registration rejected.");
                    }
                }
            }
            ClientMessage::BaseTap { base_id } => {
                if let Err(rejection) = self.engine.handle_base_tap(&base_id) {
                    tracing::debug!(base = base_id.as_str(), code = rejection.code(), "Base tap rejected.");
                }
            }
            ClientMessage::Ping => {}
        }
    }

    fn identify(&mut self, conn_id: u64, kind: ClientKind) {
        if let Some(connection) = self.connections.get_mut(&conn_id) {
            connection.kind = kind;
        }
    }

    /// Direct targeted send, used for acknowledgements to not-yet-identified
    /// connections. Outbound is best effort throughout.
    fn send_to_conn(&self, conn_id: u64, message: ServerMessage) {
        let Some(connection) = self.connections.get(&conn_id) else {
            return;
        };
        if connection.sender.try_send(message).is_err() {
            tracing::warn!(conn_id, "Dropping message for a slow or gone connection.");
        }
    }

    fn flush_outbound(&mut self) {
        for record in self.engine.drain_outbound() {
            match record {
                Outbound::Broadcast(message) => {
                    for (conn_id, connection) in &self.connections {
                        if connection.sender.try_send(message.clone()).is_err() {
                            tracing::warn!(conn_id, "Dropping broadcast for a slow connection.");
                        }
                    }
                }
                Outbound::ToPlayer { player_id, message } => {
                    for connection in self.connections.values().filter(|c| {
                        matches!(&c.kind, ClientKind::Player { player_id: id } if *id == player_id)
                    }) {
                        if connection.sender.try_send(message.clone()).is_err() {
                            tracing::warn!(player = player_id.as_str(), "Dropping targeted message.");
                        }
                    }
                }
                Outbound::ToBase { base_id, message } => {
                    for connection in self.connections.values().filter(|c| {
                        matches!(&c.kind, ClientKind::Base { base_id: id } if *id == base_id)
                    }) {
                        if connection.sender.try_send(message.clone()).is_err() {
                            tracing::warn!(base = base_id.as_str(), "Dropping targeted message.");
                        }
                    }
                }
            }
        }
    }

    /// Best effort, asynchronous; the in-memory settings stay authoritative.
    fn persist_settings(&self) {
        crate::settings_store::spawn_save(self.settings_path.clone(), self.engine.settings().clone());
    }
}

fn to_api_result(result: Result<(), game_engine::Rejection>) -> ApiResult {
    match result {
        Ok(()) => ApiResult::ok(),
        Err(rejection) => ApiResult::err(rejection.to_string()),
    }
}
