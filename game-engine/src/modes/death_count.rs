//! DeathCount: fixed-length rounds where everyone respawns until the timer runs
//! out and the fewest deaths place best. With teams enabled the team death
//! totals rank instead and the bonuses land on team match points.

use super::{
    ModeBehavior, ModeCtx, ModeMeta, WinCheck, award_and_transfer, placement_bonus, rank_sorted,
    unique_leader,
};
use crate::respawn::RespawnManager;
use protocol::{GamePhase, ScoreEntry, ServerMessage, TeamScoreEntry};

/// Seconds a casualty waits before rejoining the round.
pub const RESPAWN_DELAY_MS: u64 = 5000;

pub struct DeathCountMode {
    round_count: u32,
    round_duration_ms: u64,
    respawns: RespawnManager,
}

impl DeathCountMode {
    pub fn new(round_count: u32, round_duration_ms: u64) -> Self {
        DeathCountMode { round_count, round_duration_ms, respawns: RespawnManager::default() }
    }

    /// Players ranked by deaths ascending, ties sharing the lower rank.
    fn death_ranking(&self, ctx: &ModeCtx<'_>) -> Vec<(String, u32)> {
        let mut keyed: Vec<(String, u32)> = ctx
            .players
            .iter()
            .map(|p| (p.id.clone(), p.death_count))
            .collect();
        keyed.sort_by_key(|(_, deaths)| *deaths);
        rank_sorted(&keyed)
    }

    fn team_death_totals(&self, ctx: &ModeCtx<'_>) -> Vec<(u32, u32)> {
        ctx.teams
            .teams()
            .iter()
            .map(|team| {
                let deaths = ctx
                    .players
                    .iter()
                    .filter(|p| p.team_id == Some(team.id))
                    .map(|p| p.death_count)
                    .sum();
                (team.id, deaths)
            })
            .collect()
    }
}

impl ModeBehavior for DeathCountMode {
    fn meta(&self) -> ModeMeta {
        ModeMeta {
            key: "death-count",
            display_name: "Death Count",
            min_players: 2,
            max_players: 16,
            use_roles: false,
            multi_round: true,
            round_count: self.round_count,
            round_duration_ms: Some(self.round_duration_ms),
            target_score: None,
            uses_teams: true,
            uses_bases: false,
        }
    }

    fn on_round_start(&mut self, _ctx: &mut ModeCtx<'_>) {
        self.respawns.clear();
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
    }

    fn on_player_death(&mut self, ctx: &mut ModeCtx<'_>, victim_id: &str) {
        // Too close to the round end means staying out until it falls.
        if self
            .respawns
            .schedule(victim_id, ctx.now, RESPAWN_DELAY_MS, Some(self.round_duration_ms))
        {
            ctx.queue.to_player(
                victim_id,
                ServerMessage::PlayerRespawnPending { respawn_in: RESPAWN_DELAY_MS },
            );
        }
    }

    fn check_win_condition(&mut self, ctx: &mut ModeCtx<'_>) -> WinCheck {
        match ctx.phase {
            GamePhase::Active => {
                if ctx.now < self.round_duration_ms {
                    return WinCheck::none();
                }
                let ranking = self.death_ranking(ctx);
                let winner = match ranking.as_slice() {
                    [(id, _), rest @ ..] if !rest.iter().any(|(_, r)| *r == 1) => Some(id.clone()),
                    _ => None,
                };
                WinCheck {
                    round_ended: true,
                    game_ended: ctx.current_round >= self.round_count,
                    winner,
                }
            }
            GamePhase::RoundEnded => {
                if ctx.current_round >= self.round_count {
                    WinCheck {
                        round_ended: true,
                        game_ended: true,
                        winner: unique_leader(ctx.players),
                    }
                } else {
                    WinCheck::none()
                }
            }
            _ => WinCheck::none(),
        }
    }

    fn on_round_end(&mut self, ctx: &mut ModeCtx<'_>) {
        self.respawns.clear();
        let ranking = self.death_ranking(ctx);
        let winner_id = match ranking.as_slice() {
            [(id, _)] => Some(id.clone()),
            [(id, _), (_, second_rank), ..] if *second_rank != 1 => Some(id.clone()),
            _ => None,
        };

        let scores: Vec<ScoreEntry>;
        if ctx.teams.is_enabled() {
            // Team play: the bonuses go to team match points, not to players.
            let mut totals: Vec<(String, u32)> = self
                .team_death_totals(ctx)
                .into_iter()
                .map(|(team_id, deaths)| (team_id.to_string(), deaths))
                .collect();
            totals.sort_by_key(|(_, deaths)| *deaths);
            for (team_key, rank) in rank_sorted(&totals) {
                let team_id: u32 = team_key.parse().unwrap_or(0);
                ctx.teams.add_points(team_id, placement_bonus(rank, None));
            }
            scores = ranking
                .iter()
                .filter_map(|(id, rank)| {
                    ctx.player(id).map(|p| ScoreEntry {
                        player_id: p.id.clone(),
                        name: p.name.clone(),
                        number: p.number,
                        points: p.points,
                        total_points: p.total_points + p.points,
                        rank: *rank,
                    })
                })
                .collect();
            for player in ctx.players.iter_mut() {
                player.total_points += player.points;
            }
        } else {
            scores = award_and_transfer(ctx.players, &ranking);
        }

        let team_scores = ctx.team_scores();
        ctx.queue.broadcast(ServerMessage::RoundEnd {
            round_number: ctx.current_round,
            scores,
            game_time: ctx.now,
            winner_id,
            team_scores,
        });
    }

    fn team_score_data(&self, ctx: &ModeCtx<'_>) -> Option<Vec<TeamScoreEntry>> {
        ctx.team_scores()
    }
}
