//! RoleBased: the Classic round structure with a themed role pool on top, plus
//! the cooperative early round end for players sharing a victory group.

use super::{ModeBehavior, ModeCtx, ModeMeta, WinCheck, award_and_transfer, survival_ranking, unique_leader};
use crate::roles::{RoleKind, role_pool_for_theme};
use protocol::{GamePhase, ServerMessage};

pub struct RoleBasedMode {
    round_count: u32,
    target_score: Option<u32>,
    death_order: Vec<String>,
}

impl RoleBasedMode {
    pub fn new(round_count: u32, target_score: Option<u32>) -> Self {
        RoleBasedMode { round_count, target_score, death_order: Vec::new() }
    }

    fn game_over(&self, ctx: &ModeCtx<'_>) -> bool {
        if ctx.current_round >= self.round_count {
            return true;
        }
        match self.target_score {
            Some(target) => ctx.players.iter().any(|p| p.total_points >= target),
            None => false,
        }
    }

    /// The cooperative end: at least two still standing and every one of them
    /// carries the same non-null victory group tag.
    fn victory_group_win(&self, ctx: &ModeCtx<'_>, alive: &[String]) -> bool {
        if alive.len() < 2 {
            return false;
        }
        let mut group: Option<&str> = None;
        for id in alive {
            let Some(tag) = ctx.player(id).and_then(|p| p.victory_group_id.as_deref()) else {
                return false;
            };
            match group {
                None => group = Some(tag),
                Some(g) if g != tag => return false,
                Some(_) => {}
            }
        }
        group.is_some()
    }
}

impl ModeBehavior for RoleBasedMode {
    fn meta(&self) -> ModeMeta {
        ModeMeta {
            key: "role-based",
            display_name: "Roles",
            min_players: 2,
            max_players: 16,
            use_roles: true,
            multi_round: true,
            round_count: self.round_count,
            round_duration_ms: None,
            target_score: self.target_score,
            uses_teams: false,
            uses_bases: false,
        }
    }

    fn on_round_start(&mut self, _ctx: &mut ModeCtx<'_>) {
        self.death_order.clear();
    }

    fn on_player_death(&mut self, _ctx: &mut ModeCtx<'_>, victim_id: &str) {
        self.death_order.push(victim_id.to_string());
    }

    fn check_win_condition(&mut self, ctx: &mut ModeCtx<'_>) -> WinCheck {
        match ctx.phase {
            GamePhase::Active => {
                let alive = ctx.effectively_alive_ids();
                if self.victory_group_win(ctx, &alive) {
                    return WinCheck {
                        round_ended: true,
                        game_ended: self.game_over(ctx),
                        winner: None,
                    };
                }
                if alive.len() > 1 {
                    return WinCheck::none();
                }
                if let [survivor] = alive.as_slice() {
                    if !ctx.player(survivor).is_some_and(|p| p.connected) {
                        return WinCheck::none();
                    }
                }
                WinCheck {
                    round_ended: true,
                    game_ended: self.game_over(ctx),
                    winner: alive.first().cloned(),
                }
            }
            GamePhase::RoundEnded => {
                if self.game_over(ctx) {
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
        let winner_id = {
            let alive = ctx.effectively_alive_ids();
            if alive.len() == 1 { alive.into_iter().next() } else { None }
        };
        let ranking = survival_ranking(ctx.players, &self.death_order);
        let scores = award_and_transfer(ctx.players, &ranking);
        ctx.queue.broadcast(ServerMessage::RoundEnd {
            round_number: ctx.current_round,
            scores,
            game_time: ctx.now,
            winner_id,
            team_scores: None,
        });
        self.death_order.clear();
    }

    fn role_pool(&self, n: usize, theme: &str) -> Vec<RoleKind> {
        role_pool_for_theme(theme, n)
    }
}
