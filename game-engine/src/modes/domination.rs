//! Domination: one continuous round, team play around physical bases. Holding a
//! connected base pays one match point per control interval; taps cycle the
//! ownership; the first team at the point target wins outright.

use super::{ModeBehavior, ModeCtx, ModeMeta, WinCheck};
use crate::error::Rejection;
use crate::respawn::RespawnManager;
use protocol::{ServerMessage, TeamScoreEntry};

pub struct DominationMode {
    point_target: u32,
    control_interval_ms: u64,
    respawn_delay_ms: u64,
    respawns: RespawnManager,
    winning_team: Option<u32>,
}

impl DominationMode {
    pub fn new(point_target: u32, control_interval_ms: u64, respawn_delay_ms: u64) -> Self {
        DominationMode {
            point_target,
            control_interval_ms,
            respawn_delay_ms,
            respawns: RespawnManager::default(),
            winning_team: None,
        }
    }

    fn broadcast_base_status(&self, ctx: &mut ModeCtx<'_>) {
        let bases = ctx.bases.status_entries(ctx.now, self.control_interval_ms);
        ctx.queue.broadcast(ServerMessage::BaseStatus { bases });
    }
}

impl ModeBehavior for DominationMode {
    fn meta(&self) -> ModeMeta {
        ModeMeta {
            key: "domination",
            display_name: "Domination",
            min_players: 2,
            max_players: 16,
            use_roles: false,
            multi_round: false,
            round_count: 1,
            round_duration_ms: None,
            target_score: Some(self.point_target),
            uses_teams: true,
            uses_bases: true,
        }
    }

    fn on_mode_selected(&mut self, ctx: &mut ModeCtx<'_>) {
        ctx.teams.clear_points();
        self.winning_team = None;
    }

    fn on_round_start(&mut self, ctx: &mut ModeCtx<'_>) {
        self.respawns.clear();
        self.winning_team = None;
        ctx.teams.clear_points();
        ctx.bases.reset_control_timers(ctx.now);
        self.broadcast_base_status(ctx);
    }

    fn on_tick(&mut self, ctx: &mut ModeCtx<'_>) {
        for player_id in self.respawns.take_due(ctx.now) {
            let now = ctx.now;
            let Some(player) = ctx.player_mut(&player_id) else {
                tracing::error!(player = player_id.as_str(), "Respawn due for unknown player.");
                continue;
            };
            player.respawn();
            let (name, number) = (player.name.clone(), player.number);
            ctx.queue.broadcast(ServerMessage::PlayerRespawn {
                player_id,
                player_name: name,
                player_number: number,
                game_time: now,
            });
        }

        // Pay out every full control interval of uninterrupted ownership.
        let interval = self.control_interval_ms;
        let mut awards = Vec::new();
        for base in ctx.bases.bases_mut() {
            if !base.is_connected {
                continue;
            }
            let Some(owner) = base.owner_team_id else { continue };
            while ctx.now.saturating_sub(base.last_ownership_change_at)
                >= (u64::from(base.points_awarded) + 1) * interval
            {
                base.points_awarded += 1;
                awards.push((base.base_id.clone(), base.base_number, owner));
            }
        }
        for (base_id, base_number, team_id) in awards {
            ctx.teams.add_points(team_id, 1);
            let team_scores = ctx.teams.score_entries();
            ctx.queue.broadcast(ServerMessage::BasePoint {
                base_id,
                base_number,
                team_id,
                team_scores,
            });
        }

        if self.winning_team.is_none() {
            let winner = ctx
                .teams
                .teams()
                .iter()
                .map(|t| t.id)
                .find(|id| ctx.teams.points(*id) >= self.point_target);
            if let Some(team_id) = winner {
                self.winning_team = Some(team_id);
                let team_name = ctx
                    .teams
                    .team(team_id)
                    .map(|t| t.name.to_string())
                    .unwrap_or_default();
                let team_scores = ctx.teams.score_entries();
                ctx.queue.broadcast(ServerMessage::DominationWin {
                    winning_team_id: team_id,
                    winning_team_name: team_name,
                    team_scores,
                });
            }
        }

        self.broadcast_base_status(ctx);
    }

    fn on_player_death(&mut self, ctx: &mut ModeCtx<'_>, victim_id: &str) {
        // No round clock here, so the respawn is always scheduled.
        self.respawns
            .schedule(victim_id, ctx.now, self.respawn_delay_ms, None);
        ctx.queue.to_player(
            victim_id,
            ServerMessage::PlayerRespawnPending { respawn_in: self.respawn_delay_ms },
        );
    }

    fn check_win_condition(&mut self, _ctx: &mut ModeCtx<'_>) -> WinCheck {
        match self.winning_team {
            Some(_) => WinCheck { round_ended: true, game_ended: true, winner: None },
            None => WinCheck::none(),
        }
    }

    fn on_round_end(&mut self, ctx: &mut ModeCtx<'_>) {
        self.respawns.clear();
        for player in ctx.players.iter_mut() {
            player.total_points += player.points;
        }
        let team_scores = ctx.team_scores();
        ctx.queue.broadcast(ServerMessage::RoundEnd {
            round_number: ctx.current_round,
            scores: super::ranked_by_total_points(ctx.players),
            game_time: ctx.now,
            winner_id: None,
            team_scores,
        });
    }

    fn on_base_tap(&mut self, ctx: &mut ModeCtx<'_>, base_id: &str) -> Result<(), Rejection> {
        let team_ids = ctx.teams.team_ids();
        let base = ctx.bases.cycle_owner(base_id, &team_ids, ctx.now)?;
        let (base_id, base_number, team_id) = (
            base.base_id.clone(),
            base.base_number,
            base.owner_team_id.expect("cycle always lands on a team"),
        );
        let Some(team) = ctx.teams.team(team_id) else {
            return Err(Rejection::WrongPhase);
        };
        let (team_name, team_color) = (team.name.to_string(), team.color.to_string());
        ctx.queue.broadcast(ServerMessage::BaseCaptured {
            base_id,
            base_number,
            team_id,
            team_name,
            team_color,
        });
        self.broadcast_base_status(ctx);
        Ok(())
    }

    fn team_score_data(&self, ctx: &ModeCtx<'_>) -> Option<Vec<TeamScoreEntry>> {
        ctx.team_scores()
    }
}
