//! The engine orchestrator: owns the player set, the registries and the current
//! mode, drives the lifecycle state machine and hosts the tick dispatch. All
//! mutation happens inside one logical owner; the hosting layer serializes
//! inbound messages and ticks onto it and drains the outbound queue afterwards.

use crate::bases::BaseRegistry;
use crate::clock::TickClock;
use crate::connection::ConnectionRegistry;
use crate::error::Rejection;
use crate::events::{EventCtx, GameEventBehavior, SpeedShift};
use crate::modes::{ModeBehavior, ModeCtx, WinCheck, create_mode};
use crate::movement::{AccelSample, MovementState};
use crate::outbound::{Outbound, OutboundQueue};
use crate::player::Player;
use crate::roles;
use crate::settings::GameSettings;
use crate::teams::TeamRegistry;
use protocol::{
    ChargeInfo, GamePhase, GameStateResponse, GameTickPayload, LobbyPlayer, ServerMessage,
    SettingsUpdate,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// What a successful join hands back for the targeted acknowledgement.
#[derive(Clone, Debug)]
pub struct JoinAck {
    pub player_id: String,
    pub session_token: String,
    pub player_number: u32,
    pub name: String,
    pub team_id: Option<u32>,
}

/// What a successful reconnect hands back for the targeted acknowledgement.
#[derive(Clone, Debug)]
pub struct ReconnectAck {
    pub player_id: String,
    pub player_number: u32,
    pub player: Option<protocol::PlayerSnapshot>,
    pub game_state: GamePhase,
    pub current_round: u32,
    pub total_rounds: u32,
    pub mode: Option<String>,
}

/// What a base registration hands back for the targeted acknowledgement.
#[derive(Clone, Debug)]
pub struct BaseAck {
    pub base_id: String,
    pub base_number: u32,
    pub owner_team_id: Option<u32>,
    pub game_state: GamePhase,
}

pub struct Engine {
    phase: GamePhase,
    clock: TickClock,
    settings: GameSettings,
    movement: MovementState,
    players: Vec<Player>,
    registry: ConnectionRegistry,
    teams: TeamRegistry,
    bases: BaseRegistry,
    mode: Option<Box<dyn ModeBehavior>>,
    events: Vec<Box<dyn GameEventBehavior>>,
    queue: OutboundQueue,
    rng: StdRng,
    /// 1-based round currently played; 0 before the first round.
    current_round: u32,
    total_rounds: u32,
    /// Remembered for the post-game auto relaunch.
    last_mode_key: Option<String>,
    countdown_seconds: u32,
    countdown_remaining_ms: u64,
    /// Set once the final "go" is announced; counts down the go delay.
    go_remaining_ms: Option<u64>,
    ready_enabled: bool,
    ready_enable_at_wall: Option<u64>,
}

impl Engine {
    pub fn new(settings: GameSettings) -> Self {
        Self::with_rng(settings, StdRng::from_entropy())
    }

    /// Seeded construction for deterministic tests.
    pub fn with_rng(settings: GameSettings, rng: StdRng) -> Self {
        let countdown_seconds = settings.countdown_seconds;
        Engine {
            phase: GamePhase::Waiting,
            clock: TickClock::new(settings.tick_rate_ms),
            movement: MovementState::new(settings.movement.clone()),
            settings,
            players: Vec::new(),
            registry: ConnectionRegistry::default(),
            teams: TeamRegistry::default(),
            bases: BaseRegistry::default(),
            mode: None,
            events: Vec::new(),
            queue: OutboundQueue::default(),
            rng,
            current_round: 0,
            total_rounds: 0,
            last_mode_key: None,
            countdown_seconds,
            countdown_remaining_ms: 0,
            go_remaining_ms: None,
            ready_enabled: true,
            ready_enable_at_wall: None,
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn game_time(&self) -> u64 {
        self.clock.game_time()
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn tick_rate_ms(&self) -> u64 {
        self.clock.tick_rate_ms()
    }

    /// Whether the hosting loop should feed ticks right now.
    pub fn wants_ticks(&self) -> bool {
        matches!(self.phase, GamePhase::Active | GamePhase::Countdown)
    }

    pub fn drain_outbound(&mut self) -> Vec<Outbound> {
        self.queue.drain()
    }

    // ---- mode and event plumbing ----

    fn with_mode<R>(
        &mut self,
        f: impl FnOnce(&mut Box<dyn ModeBehavior>, &mut ModeCtx<'_>) -> R,
    ) -> Option<R> {
        let Some(mut mode) = self.mode.take() else {
            return None;
        };
        let mut ctx = ModeCtx {
            now: self.clock.game_time(),
            phase: self.phase,
            current_round: self.current_round,
            players: &mut self.players,
            teams: &mut self.teams,
            bases: &mut self.bases,
            movement: &mut self.movement,
            queue: &mut self.queue,
            rng: &mut self.rng,
            settings: &self.settings,
        };
        let result = f(&mut mode, &mut ctx);
        self.mode = Some(mode);
        Some(result)
    }

    fn dispatch_events(&mut self, f: impl Fn(&mut Box<dyn GameEventBehavior>, &mut EventCtx<'_>)) {
        let mode_name = self.last_mode_key.clone().unwrap_or_default();
        let now = self.clock.game_time();
        let mut events = std::mem::take(&mut self.events);
        for event in events.iter_mut() {
            let mut ctx = EventCtx {
                now,
                mode_name: &mode_name,
                movement: &mut self.movement,
                queue: &mut self.queue,
                rng: &mut self.rng,
            };
            f(event, &mut ctx);
        }
        self.events = events;
    }

    // ---- lobby ----

    /// `player:join`. Allowed while no game runs; numbers and tokens come from
    /// the connection registry.
    pub fn handle_join(
        &mut self,
        player_id: &str,
        name: &str,
        wall_ms: u64,
    ) -> Result<JoinAck, Rejection> {
        if !matches!(self.phase, GamePhase::Waiting | GamePhase::PreGame) {
            return Err(Rejection::JoinRefused);
        }
        let entry = self
            .registry
            .register(player_id, name, wall_ms, &mut self.rng);
        let (token, number) = (entry.session_token.clone(), entry.number);

        let team_id;
        if let Some(player) = self.players.iter_mut().find(|p| p.id == player_id) {
            player.mark_connected();
            player.name = name.to_string();
            team_id = player.team_id;
        } else {
            let mut player = Player::new(player_id.to_string(), name.to_string(), number);
            player.team_id = self.teams.next_team_for_join(&self.players);
            team_id = player.team_id;
            self.players.push(player);
        }

        self.emit_lobby_update();
        if self.teams.is_enabled() {
            self.emit_team_update();
        }
        Ok(JoinAck {
            player_id: player_id.to_string(),
            session_token: token,
            player_number: number,
            name: name.to_string(),
            team_id,
        })
    }

    /// `player:reconnect`. Rebinds the session and answers with a snapshot.
    pub fn handle_reconnect(&mut self, token: &str, wall_ms: u64) -> Result<ReconnectAck, Rejection> {
        let player_id = self
            .registry
            .by_token(token)
            .map(|e| e.player_id.clone())
            .ok_or(Rejection::UnknownToken)?;
        self.registry.mark_reconnected(&player_id, wall_ms);
        let grace_ms = self.settings.disconnect_grace_ms;
        let now = self.clock.game_time();
        let (number, snapshot) = match self.players.iter_mut().find(|p| p.id == player_id) {
            Some(player) => {
                player.mark_connected();
                (player.number, Some(player.snapshot(now, grace_ms)))
            }
            None => (0, None),
        };
        self.emit_lobby_update();
        Ok(ReconnectAck {
            player_id,
            player_number: number,
            player: snapshot,
            game_state: self.phase,
            current_round: self.current_round,
            total_rounds: self.total_rounds,
            mode: self.last_mode_key.clone(),
        })
    }

    /// Transport loss. In the lobby a grace timer starts; mid-game the player
    /// stays in play until the disconnect grace expires.
    pub fn handle_disconnect(&mut self, player_id: &str, wall_ms: u64) {
        if self.registry.get(player_id).is_none() {
            return;
        }
        if self.phase == GamePhase::Waiting {
            self.registry
                .mark_disconnected(player_id, Some(wall_ms + self.settings.lobby_grace_ms));
        } else {
            self.registry.mark_disconnected(player_id, None);
        }
        let game_now = self.clock.game_time();
        if let Some(player) = self.players.iter_mut().find(|p| p.id == player_id) {
            player.mark_disconnected(game_now);
        }
        self.emit_lobby_update();
    }

    /// Periodic wall-clock maintenance: lobby grace expiry and the ready-input
    /// re-enable after the post-round delay.
    pub fn housekeeping(&mut self, wall_ms: u64) {
        let expired = self.registry.expire_lobby_grace(wall_ms);
        if !expired.is_empty() {
            for player_id in &expired {
                tracing::info!(player = player_id.as_str(), "Lobby grace expired, removing player.");
                self.players.retain(|p| p.id != *player_id);
            }
            self.emit_lobby_update();
            if self.teams.is_enabled() {
                self.emit_team_update();
            }
        }
        if let Some(at) = self.ready_enable_at_wall {
            if wall_ms >= at {
                self.ready_enable_at_wall = None;
                self.ready_enabled = true;
                self.queue.broadcast(ServerMessage::ReadyEnabled { enabled: true });
            }
        }
    }

    /// `player:ready`: phase-dependent toggle, see the lifecycle rules.
    pub fn handle_ready(&mut self, player_id: &str, wall_ms: u64) -> Result<(), Rejection> {
        match self.phase {
            GamePhase::Waiting | GamePhase::PreGame => {
                let player = self
                    .players
                    .iter_mut()
                    .find(|p| p.id == player_id)
                    .ok_or(Rejection::UnknownPlayer)?;
                player.is_ready = !player.is_ready;
                self.emit_ready_update();
                self.emit_lobby_update();
                if self.phase == GamePhase::PreGame && self.all_connected_ready() {
                    self.start_countdown();
                }
                Ok(())
            }
            GamePhase::RoundEnded => {
                if !self.ready_enabled {
                    return Err(Rejection::ReadyDelay);
                }
                let player = self
                    .players
                    .iter_mut()
                    .find(|p| p.id == player_id)
                    .ok_or(Rejection::UnknownPlayer)?;
                player.is_ready = !player.is_ready;
                self.emit_ready_update();
                if self.all_connected_ready() {
                    self.start_countdown();
                }
                Ok(())
            }
            GamePhase::Finished => {
                if !self.ready_enabled {
                    return Err(Rejection::ReadyDelay);
                }
                let entry = self
                    .registry
                    .get_mut(player_id)
                    .ok_or(Rejection::UnknownPlayer)?;
                entry.lobby_ready = !entry.lobby_ready;
                let connected: Vec<_> = self
                    .registry
                    .entries()
                    .iter()
                    .filter(|e| e.connected)
                    .collect();
                let ready = connected.iter().filter(|e| e.lobby_ready).count();
                let total = connected.len();
                self.queue.broadcast(ServerMessage::ReadyUpdate {
                    ready: ready as u32,
                    total: total as u32,
                });
                if total >= 2 && ready == total {
                    // Auto relaunch with the remembered mode.
                    if let Some(key) = self.last_mode_key.clone() {
                        self.phase = GamePhase::Waiting;
                        if let Err(err) = self.launch(&key, None) {
                            tracing::error!(%err, "Auto relaunch failed.");
                        }
                    }
                }
                Ok(())
            }
            _ => Err(Rejection::WrongPhase),
        }
    }

    fn all_connected_ready(&self) -> bool {
        let connected: Vec<&Player> = self.players.iter().filter(|p| p.connected).collect();
        connected.len() >= 2 && connected.iter().all(|p| p.is_ready)
    }

    // ---- movement, abilities, bases ----

    /// `player:move`. Silently dropped unless a round is running.
    pub fn handle_move(&mut self, player_id: &str, sample: AccelSample) {
        if self.phase != GamePhase::Active || !sample.is_finite() {
            return;
        }
        let config = self.movement.config().clone();
        let now = self.clock.game_time();
        let Some(player) = self.players.iter_mut().find(|p| p.id == player_id) else {
            return;
        };
        let outcome = player.update_movement(sample, now, &config);
        if outcome.died {
            self.process_death(player_id);
        }
    }

    /// `player:tap`: the ability contract. The result always goes back to the
    /// sender as a targeted message.
    pub fn handle_tap(&mut self, player_id: &str) {
        let result = self.try_tap(player_id);
        let charges = self
            .players
            .iter()
            .find(|p| p.id == player_id)
            .map(|p| ChargeInfo {
                current: p.role.current_charges,
                max: p.role.max_charges,
                cooldown_remaining: p.role.cooldown_remaining_ms,
            });
        let message = match result {
            Ok(()) => ServerMessage::PlayerTapResult { success: true, reason: None, charges },
            Err(rejection) => ServerMessage::PlayerTapResult {
                success: false,
                reason: Some(rejection.code().to_string()),
                charges,
            },
        };
        self.queue.to_player(player_id, message);
    }

    fn try_tap(&mut self, player_id: &str) -> Result<(), Rejection> {
        if self.phase != GamePhase::Active {
            return Err(Rejection::NotActive);
        }
        let now = self.clock.game_time();
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or(Rejection::UnknownPlayer)?;
        if !player.is_alive {
            return Err(Rejection::AbilityFailed);
        }
        roles::use_ability(player, now)
    }

    /// `team:switch`: cycles the caller's team while the lobby is open.
    pub fn handle_team_switch(&mut self, player_id: &str) -> Result<(), Rejection> {
        if !matches!(self.phase, GamePhase::Waiting | GamePhase::PreGame) {
            return Err(Rejection::WrongPhase);
        }
        if !self.teams.is_enabled() {
            return Err(Rejection::WrongPhase);
        }
        let next = {
            let player = self
                .players
                .iter()
                .find(|p| p.id == player_id)
                .ok_or(Rejection::UnknownPlayer)?;
            self.teams.next_team_after(player.team_id)
        };
        if let Some(player) = self.players.iter_mut().find(|p| p.id == player_id) {
            player.team_id = next;
        }
        self.emit_team_update();
        self.emit_lobby_update();
        Ok(())
    }

    /// `base:register`. Known ids reconnect, new ones take a free slot.
    pub fn handle_base_register(&mut self, base_id: Option<String>) -> Result<BaseAck, Rejection> {
        let now = self.clock.game_time();
        let max = self.settings.domination_base_count as usize;
        let base = self.bases.register(base_id, max, now)?;
        let ack = BaseAck {
            base_id: base.base_id.clone(),
            base_number: base.base_number,
            owner_team_id: base.owner_team_id,
            game_state: self.phase,
        };
        let interval = self.settings.domination_control_interval_ms();
        let entries = self.bases.status_entries(now, interval);
        self.queue.broadcast(ServerMessage::BaseStatus { bases: entries });
        Ok(ack)
    }

    pub fn handle_base_disconnect(&mut self, base_id: &str) {
        if self.bases.mark_disconnected(base_id) {
            let now = self.clock.game_time();
            let interval = self.settings.domination_control_interval_ms();
            let entries = self.bases.status_entries(now, interval);
            self.queue.broadcast(ServerMessage::BaseStatus { bases: entries });
        }
    }

    /// `base:tap`. Only meaningful while a round runs; the mode decides the rest.
    pub fn handle_base_tap(&mut self, base_id: &str) -> Result<(), Rejection> {
        if self.phase != GamePhase::Active {
            return Err(Rejection::NotActive);
        }
        self.with_mode(|mode, ctx| mode.on_base_tap(ctx, base_id))
            .unwrap_or(Err(Rejection::WrongPhase))
    }

    // ---- admin surface ----

    pub fn update_settings(&mut self, update: &SettingsUpdate) {
        self.settings.apply_update(update);
        self.clock.set_tick_rate_ms(self.settings.tick_rate_ms);
        // Movement tuning applies immediately outside a running round.
        if self.phase != GamePhase::Active {
            self.movement.set_config(self.settings.movement.clone());
        }
    }

    /// Admin `launch`: waiting to pre-game with at least two connected players.
    pub fn launch(&mut self, mode_key: &str, countdown_seconds: Option<u32>) -> Result<(), Rejection> {
        if self.phase != GamePhase::Waiting {
            return Err(Rejection::WrongPhase);
        }
        let mode = create_mode(mode_key, &self.settings).ok_or(Rejection::UnknownMode)?;
        let meta = mode.meta();
        if self.registry.connected_count() < meta.min_players.max(2) {
            return Err(Rejection::NeedPlayers(2));
        }

        self.mode = Some(mode);
        self.last_mode_key = Some(mode_key.to_string());
        self.total_rounds = meta.round_count;
        self.current_round = 0;
        self.countdown_seconds = countdown_seconds.unwrap_or(self.settings.countdown_seconds);
        self.movement.set_config(self.settings.movement.clone());

        // Fresh game: totals and ready state start over.
        for player in &mut self.players {
            player.total_points = 0;
            player.reset_for_round();
        }
        self.registry.reset_lobby_ready();

        if meta.uses_teams && (self.settings.teams_enabled || meta.key == "domination") {
            self.teams.configure(self.settings.team_count);
            for i in 0..self.players.len() {
                let keeps_team = self.players[i]
                    .team_id
                    .is_some_and(|id| self.teams.team(id).is_some());
                if !keeps_team {
                    let next = self.teams.next_team_for_join(&self.players);
                    self.players[i].team_id = next;
                }
            }
            self.emit_team_update();
        } else {
            self.teams.disable();
            for player in &mut self.players {
                player.team_id = None;
            }
        }

        self.events.clear();
        if meta.key != "domination" {
            self.events.push(Box::new(SpeedShift::new()));
        }

        self.with_mode(|mode, ctx| mode.on_mode_selected(ctx));
        self.phase = GamePhase::PreGame;
        self.queue.broadcast(ServerMessage::GameStart {
            mode: mode_key.to_string(),
            total_rounds: self.total_rounds,
            sensitivity: self.settings.sensitivity.clone(),
        });
        self.emit_lobby_update();
        self.emit_ready_update();
        Ok(())
    }

    /// Admin `proceed`: pre-game to countdown.
    pub fn proceed(&mut self) -> Result<(), Rejection> {
        if self.phase != GamePhase::PreGame {
            return Err(Rejection::WrongPhase);
        }
        self.start_countdown();
        Ok(())
    }

    /// Admin `start-next-round`: round-ended to countdown.
    pub fn start_next_round(&mut self) -> Result<(), Rejection> {
        if self.phase != GamePhase::RoundEnded {
            return Err(Rejection::WrongPhase);
        }
        self.start_countdown();
        Ok(())
    }

    /// Admin `stop`: any state back to waiting, lobby membership intact.
    pub fn stop(&mut self) {
        self.phase = GamePhase::Waiting;
        self.clock.stop();
        self.clock.reset();
        self.mode = None;
        self.events.clear();
        self.movement.set_config(self.settings.movement.clone());
        self.current_round = 0;
        self.total_rounds = 0;
        self.go_remaining_ms = None;
        self.ready_enabled = true;
        self.ready_enable_at_wall = None;
        for player in &mut self.players {
            player.reset_for_round();
            player.total_points = 0;
        }
        self.registry.reset_lobby_ready();
        self.queue.broadcast(ServerMessage::GameStopped {});
        self.emit_lobby_update();
    }

    /// Admin `kick`: permanent removal, the number frees up.
    pub fn kick(&mut self, player_id: &str) -> Result<(), Rejection> {
        if !self.registry.remove(player_id) {
            return Err(Rejection::UnknownPlayer);
        }
        self.players.retain(|p| p.id != player_id);
        self.emit_lobby_update();
        if self.teams.is_enabled() {
            self.emit_team_update();
        }
        Ok(())
    }

    /// Admin `shuffle-teams`: waiting or pre-game only.
    pub fn shuffle_teams(&mut self) -> Result<(), Rejection> {
        if !matches!(self.phase, GamePhase::Waiting | GamePhase::PreGame) {
            return Err(Rejection::WrongPhase);
        }
        if !self.teams.is_enabled() {
            return Err(Rejection::WrongPhase);
        }
        self.teams.shuffle(&mut self.players, &mut self.rng);
        self.emit_team_update();
        self.emit_lobby_update();
        Ok(())
    }

    /// Admin `debug/reset`: stop plus a cleared lobby; settings survive.
    pub fn reset(&mut self) {
        self.stop();
        self.players.clear();
        self.registry.clear();
        self.teams.disable();
        self.bases.clear();
        self.emit_lobby_update();
    }

    // ---- lifecycle internals ----

    fn start_countdown(&mut self) {
        self.phase = GamePhase::Countdown;
        self.countdown_remaining_ms = u64::from(self.countdown_seconds) * 1000;
        self.go_remaining_ms = None;
        self.clock.start();
        self.queue.broadcast(ServerMessage::GameCountdown {
            phase: "countdown".into(),
            seconds_remaining: self.countdown_seconds,
        });
    }

    fn begin_round(&mut self) {
        self.current_round += 1;
        self.clock.reset();
        self.clock.start();
        self.movement.set_config(self.settings.movement.clone());

        for player in &mut self.players {
            player.reset_for_round();
        }

        let use_roles = self
            .mode
            .as_ref()
            .map(|m| m.meta().use_roles)
            .unwrap_or(false);
        if use_roles {
            self.assign_roles();
        } else {
            for player in &mut self.players {
                player.assign_role(crate::roles::RoleKind::Survivor);
            }
        }

        self.with_mode(|mode, ctx| mode.on_round_start(ctx));
        self.dispatch_events(|event, ctx| event.on_round_start(ctx));

        self.phase = GamePhase::Active;
        self.queue.broadcast(ServerMessage::RoundStart {
            round_number: self.current_round,
            total_rounds: self.total_rounds,
            game_time: 0,
        });
    }

    /// Pool expansion, shuffle, target picking, then one briefing per player.
    fn assign_roles(&mut self) {
        let theme = self.settings.theme.clone();
        let n = self.players.len();
        let mut pool = self
            .mode
            .as_ref()
            .map(|m| m.role_pool(n, &theme))
            .unwrap_or_else(|| vec![crate::roles::RoleKind::Survivor; n]);
        use rand::seq::SliceRandom;
        pool.shuffle(&mut self.rng);
        for (player, kind) in self.players.iter_mut().zip(pool.into_iter()) {
            player.assign_role(kind);
        }
        roles::assign_targets(&mut self.players, &mut self.rng);

        let briefings: Vec<(String, protocol::RoleInfo)> = self
            .players
            .iter()
            .map(|p| {
                let target_number = p
                    .role
                    .target_player_id
                    .as_deref()
                    .and_then(|id| self.players.iter().find(|q| q.id == id))
                    .map(|q| q.number);
                (p.id.clone(), p.role.info(target_number))
            })
            .collect();
        for (player_id, info) in briefings {
            self.queue
                .to_player(player_id, ServerMessage::RoleAssigned(info));
        }
    }

    /// One engine step. `dt` is the nominal tick in ms, `wall_ms` the hosting
    /// layer's wall clock used for the ready-delay bookkeeping.
    pub fn advance(&mut self, dt: u64, wall_ms: u64) {
        match self.phase {
            GamePhase::Countdown => self.countdown_tick(dt),
            GamePhase::Active => self.active_tick(dt, wall_ms),
            _ => {}
        }
    }

    fn countdown_tick(&mut self, dt: u64) {
        if let Some(go) = &mut self.go_remaining_ms {
            *go = go.saturating_sub(dt);
            if *go == 0 {
                self.go_remaining_ms = None;
                self.begin_round();
            }
            return;
        }
        let before = self.countdown_remaining_ms.div_ceil(1000);
        self.countdown_remaining_ms = self.countdown_remaining_ms.saturating_sub(dt);
        let after = self.countdown_remaining_ms.div_ceil(1000);
        if self.countdown_remaining_ms == 0 {
            self.queue.broadcast(ServerMessage::GameCountdown {
                phase: "go".into(),
                seconds_remaining: 0,
            });
            self.go_remaining_ms = Some(self.settings.go_delay_ms);
        } else if after < before {
            self.queue.broadcast(ServerMessage::GameCountdown {
                phase: "countdown".into(),
                seconds_remaining: after as u32,
            });
        }
    }

    fn active_tick(&mut self, dt: u64, wall_ms: u64) {
        let now = self.clock.step(dt);

        // The mode first, then events, so a threshold shift lands before the
        // damage checks of this same tick.
        self.with_mode(|mode, ctx| mode.on_tick(ctx));
        self.dispatch_events(|event, ctx| event.on_tick(ctx));

        for player_id in self.player_tick_order() {
            let Some(player) = self.players.iter_mut().find(|p| p.id == player_id) else {
                continue;
            };
            let outcome = player.on_tick(now, dt);
            if outcome.effect_kill {
                let config = self.movement.config().clone();
                if let Some(player) = self.players.iter_mut().find(|p| p.id == player_id) {
                    if player.before_death(&config).died {
                        self.process_death(&player_id);
                    }
                }
            }
            if let Some(total) = outcome.damage_burst {
                self.queue.to_player(
                    player_id.clone(),
                    ServerMessage::PlayerDamage { total_damage: total },
                );
            }
        }

        for victim_id in roles::tick_roles(&mut self.players, now, &mut self.queue) {
            let config = self.movement.config().clone();
            if let Some(player) = self.players.iter_mut().find(|p| p.id == victim_id) {
                if player.before_death(&config).died {
                    self.process_death(&victim_id);
                }
            }
        }

        let win = self
            .with_mode(|mode, ctx| mode.check_win_condition(ctx))
            .unwrap_or_else(|| {
                tracing::error!("No mode while active, stopping the round.");
                WinCheck { round_ended: true, game_ended: true, winner: None }
            });

        if win.round_ended {
            self.finish_round(win, wall_ms);
        } else {
            self.emit_game_tick();
        }
    }

    /// Players tick in role priority order, numbers breaking ties.
    fn player_tick_order(&self) -> Vec<String> {
        let mut order: Vec<(i32, u32, String)> = self
            .players
            .iter()
            .map(|p| (p.role.kind.metadata().priority, p.number, p.id.clone()))
            .collect();
        order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        order.into_iter().map(|(_, _, id)| id).collect()
    }

    /// The death fan-out: announcement, role listeners, mode, events. The
    /// victim is already marked dead when observers run.
    fn process_death(&mut self, victim_id: &str) {
        let now = self.clock.game_time();
        let Some(victim) = self.players.iter().find(|p| p.id == victim_id) else {
            tracing::error!(player = victim_id, "Death processed for unknown player.");
            return;
        };
        self.queue.broadcast(ServerMessage::PlayerDeath {
            victim_id: victim.id.clone(),
            victim_name: victim.name.clone(),
            victim_number: victim.number,
            game_time: now,
        });
        roles::on_player_death(&mut self.players, victim_id, now, &mut self.queue);
        self.with_mode(|mode, ctx| mode.on_player_death(ctx, victim_id));
        let victim_owned = victim_id.to_string();
        self.dispatch_events(move |event, ctx| event.on_player_death(ctx, &victim_owned));
    }

    fn finish_round(&mut self, win: WinCheck, wall_ms: u64) {
        self.dispatch_events(|event, ctx| event.on_round_end(ctx));
        self.with_mode(|mode, ctx| mode.on_round_end(ctx));
        self.movement.restore();
        self.clock.stop();

        self.phase = GamePhase::RoundEnded;
        let after = self
            .with_mode(|mode, ctx| mode.check_win_condition(ctx))
            .unwrap_or_default();

        if win.game_ended || after.game_ended {
            let winner = if win.game_ended { win.winner } else { after.winner };
            self.with_mode(|mode, ctx| mode.on_game_end(ctx));
            let (scores, team_scores) = self
                .with_mode(|mode, ctx| (mode.calculate_final_scores(ctx), mode.team_score_data(ctx)))
                .unwrap_or_default();
            self.queue.broadcast(ServerMessage::GameEnd {
                winner,
                scores,
                total_rounds: self.total_rounds,
                team_scores,
            });
            self.phase = GamePhase::Finished;
            self.movement.set_config(self.settings.movement.clone());
            self.registry.reset_lobby_ready();
        }

        for player in &mut self.players {
            player.is_ready = false;
        }
        self.ready_enabled = false;
        self.ready_enable_at_wall = Some(wall_ms + self.settings.ready_delay_ms);
        self.queue.broadcast(ServerMessage::ReadyEnabled { enabled: false });
        self.emit_ready_update();
    }

    // ---- snapshots and emissions ----

    fn emit_lobby_update(&mut self) {
        let players = self.lobby_players();
        self.queue.broadcast(ServerMessage::LobbyUpdate { players });
    }

    fn emit_team_update(&mut self) {
        let teams = self.teams.assignment_map(&self.players);
        self.queue.broadcast(ServerMessage::TeamUpdate { teams });
    }

    fn emit_ready_update(&mut self) {
        let connected: Vec<&Player> = self.players.iter().filter(|p| p.connected).collect();
        let ready = connected.iter().filter(|p| p.is_ready).count() as u32;
        let total = connected.len() as u32;
        self.queue.broadcast(ServerMessage::ReadyUpdate { ready, total });
    }

    fn emit_game_tick(&mut self) {
        let payload = self.tick_payload();
        self.queue.broadcast(ServerMessage::GameTick(payload));
    }

    fn tick_payload(&mut self) -> GameTickPayload {
        let now = self.clock.game_time();
        let grace = self.settings.disconnect_grace_ms;
        let players: Vec<_> = self.players.iter().map(|p| p.snapshot(now, grace)).collect();
        let round_time_remaining = self
            .with_mode(|mode, ctx| mode.round_time_remaining(ctx))
            .flatten();
        GameTickPayload { game_time: now, round_time_remaining, players }
    }

    pub fn lobby_players(&self) -> Vec<LobbyPlayer> {
        let mut rows: Vec<LobbyPlayer> = self
            .players
            .iter()
            .map(|p| LobbyPlayer {
                id: p.id.clone(),
                number: p.number,
                name: p.name.clone(),
                is_connected: p.connected,
                is_ready: p.is_ready,
                team_id: p.team_id,
            })
            .collect();
        rows.sort_by_key(|r| r.number);
        rows
    }

    pub fn state_response(&mut self) -> GameStateResponse {
        GameStateResponse {
            game_state: self.phase,
            mode: self.last_mode_key.clone(),
            current_round: self.current_round,
            total_rounds: self.total_rounds,
            snapshot: self.tick_payload(),
        }
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Direct access for the hosting layer and tests; all invariants live on
    /// the player itself.
    pub fn players_mut(&mut self) -> &mut Vec<Player> {
        &mut self.players
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }
}
