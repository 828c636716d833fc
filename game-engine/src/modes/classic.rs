//! Classic: no roles, last player moving carefully wins the round, placement
//! bonuses in reverse death order, configurable round count.

use super::{ModeBehavior, ModeCtx, ModeMeta, WinCheck, award_and_transfer, survival_ranking, unique_leader};
use protocol::{GamePhase, ServerMessage};

pub struct ClassicMode {
    round_count: u32,
    target_score: Option<u32>,
    /// Victims of the current round in death order.
    death_order: Vec<String>,
}

impl ClassicMode {
    pub fn new(round_count: u32, target_score: Option<u32>) -> Self {
        ClassicMode { round_count, target_score, death_order: Vec::new() }
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
}

impl ModeBehavior for ClassicMode {
    fn meta(&self) -> ModeMeta {
        ModeMeta {
            key: "classic",
            display_name: "Classic",
            min_players: 2,
            max_players: 16,
            use_roles: false,
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
                if alive.len() > 1 {
                    return WinCheck::none();
                }
                // A sole survivor who is disconnected but within grace holds the
                // round open: they win on reconnect, or the grace expiry below
                // empties the list and the round ends in a draw.
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
            // After the transfer the totals decide whether the game goes on.
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
}
