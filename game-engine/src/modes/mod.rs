//! The game mode strategy layer. Each mode dictates round structure, scoring,
//! respawn policy and win conditions behind one behavior trait the engine drives;
//! the engine owns the players and registries and lends them to the mode through
//! a context for the duration of a hook call.

pub mod classic;
pub mod death_count;
pub mod domination;
pub mod role_based;

use crate::bases::BaseRegistry;
use crate::error::Rejection;
use crate::movement::MovementState;
use crate::outbound::OutboundQueue;
use crate::player::Player;
use crate::roles::RoleKind;
use crate::settings::GameSettings;
use crate::teams::TeamRegistry;
use protocol::{GamePhase, ScoreEntry, TeamScoreEntry};
use rand::RngCore;

/// Bonus points by rank position, rank 1 first. Ranks beyond the table get 0.
pub const DEFAULT_PLACEMENT_BONUS: &[u32] = &[5, 3, 1];

/// Static facts about a mode.
#[derive(Clone, Debug)]
pub struct ModeMeta {
    pub key: &'static str,
    pub display_name: &'static str,
    pub min_players: usize,
    pub max_players: usize,
    pub use_roles: bool,
    pub multi_round: bool,
    pub round_count: u32,
    /// None means the round runs until a win condition ends it.
    pub round_duration_ms: Option<u64>,
    /// Total points that end the game early, if set.
    pub target_score: Option<u32>,
    pub uses_teams: bool,
    pub uses_bases: bool,
}

/// The verdict of a win-condition check.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WinCheck {
    pub round_ended: bool,
    pub game_ended: bool,
    pub winner: Option<String>,
}

impl WinCheck {
    pub fn none() -> Self {
        WinCheck::default()
    }
}

/// Everything a mode hook may touch, lent by the engine per call.
pub struct ModeCtx<'a> {
    pub now: u64,
    pub phase: GamePhase,
    /// 1-based, the round currently played or just finished.
    pub current_round: u32,
    pub players: &'a mut Vec<Player>,
    pub teams: &'a mut TeamRegistry,
    pub bases: &'a mut BaseRegistry,
    pub movement: &'a mut MovementState,
    pub queue: &'a mut OutboundQueue,
    pub rng: &'a mut dyn RngCore,
    pub settings: &'a GameSettings,
}

impl ModeCtx<'_> {
    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// Alive for win purposes: see [`Player::is_effectively_alive`].
    pub fn effectively_alive_ids(&self) -> Vec<String> {
        self.players
            .iter()
            .filter(|p| p.is_effectively_alive(self.now, self.settings.disconnect_grace_ms))
            .map(|p| p.id.clone())
            .collect()
    }

    /// Current team score rows, or none while teams are off.
    pub fn team_scores(&self) -> Option<Vec<TeamScoreEntry>> {
        if self.teams.is_enabled() { Some(self.teams.score_entries()) } else { None }
    }
}

/// The mode contract the engine drives.
pub trait ModeBehavior: Send {
    fn meta(&self) -> ModeMeta;
    fn on_mode_selected(&mut self, _ctx: &mut ModeCtx<'_>) {}
    fn on_round_start(&mut self, _ctx: &mut ModeCtx<'_>) {}
    fn on_tick(&mut self, _ctx: &mut ModeCtx<'_>) {}
    fn on_player_death(&mut self, _ctx: &mut ModeCtx<'_>, _victim_id: &str) {}
    fn check_win_condition(&mut self, ctx: &mut ModeCtx<'_>) -> WinCheck;
    /// Awards round scoring and transfers round points into totals.
    fn on_round_end(&mut self, ctx: &mut ModeCtx<'_>);
    fn on_game_end(&mut self, _ctx: &mut ModeCtx<'_>) {}
    /// The final ranking for `game:end`.
    fn calculate_final_scores(&self, ctx: &ModeCtx<'_>) -> Vec<ScoreEntry> {
        ranked_by_total_points(ctx.players)
    }
    /// The roles handed out at round start, expanded to `n` players.
    fn role_pool(&self, n: usize, _theme: &str) -> Vec<RoleKind> {
        vec![RoleKind::Survivor; n]
    }
    fn player_death_count(&self, ctx: &ModeCtx<'_>, id: &str) -> u32 {
        ctx.player(id).map(|p| p.death_count).unwrap_or(0)
    }
    /// No-op outside Domination.
    fn on_base_tap(&mut self, _ctx: &mut ModeCtx<'_>, _base_id: &str) -> Result<(), Rejection> {
        Ok(())
    }
    /// Team rows for team-mode payloads, none for free-for-all modes.
    fn team_score_data(&self, _ctx: &ModeCtx<'_>) -> Option<Vec<TeamScoreEntry>> {
        None
    }
    /// Remaining round time for the tick payload, none for open-ended rounds.
    fn round_time_remaining(&self, ctx: &ModeCtx<'_>) -> Option<u64> {
        self.meta().round_duration_ms.map(|d| d.saturating_sub(ctx.now))
    }
}

/// Instantiates a mode by its settings key.
pub fn create_mode(key: &str, settings: &GameSettings) -> Option<Box<dyn ModeBehavior>> {
    match key {
        "classic" => Some(Box::new(classic::ClassicMode::new(settings.round_count, None))),
        "role-based" => Some(Box::new(role_based::RoleBasedMode::new(settings.round_count, None))),
        "death-count" => Some(Box::new(death_count::DeathCountMode::new(
            settings.round_count,
            settings.round_duration_ms(),
        ))),
        "domination" => Some(Box::new(domination::DominationMode::new(
            settings.domination_point_target,
            settings.domination_control_interval_ms(),
            settings.domination_respawn_ms(),
        ))),
        _ => None,
    }
}

/// Ranks entries sorted ascending by key; equal keys share the lower rank,
/// so keys `[2,4,4,7]` rank `[1,2,2,4]`. The one tie-break rule used everywhere.
pub fn rank_sorted<K: PartialEq + Copy>(sorted: &[(String, K)]) -> Vec<(String, u32)> {
    let mut out = Vec::with_capacity(sorted.len());
    let mut rank = 1u32;
    for (i, (id, key)) in sorted.iter().enumerate() {
        if i > 0 && sorted[i - 1].1 != *key {
            rank = i as u32 + 1;
        }
        out.push((id.clone(), rank));
    }
    out
}

/// Bonus for a rank position, honoring a player's override vector.
pub fn placement_bonus(rank: u32, override_vector: Option<&[u32]>) -> u32 {
    let table = override_vector.unwrap_or(DEFAULT_PLACEMENT_BONUS);
    table.get(rank as usize - 1).copied().unwrap_or(0)
}

/// The survival ranking used by Classic and RoleBased: everyone still alive
/// shares rank 1, the dead follow in reverse death order.
pub fn survival_ranking(players: &[Player], death_order: &[String]) -> Vec<(String, u32)> {
    let mut keyed: Vec<(String, u32)> = Vec::with_capacity(players.len());
    for player in players.iter().filter(|p| p.is_alive) {
        keyed.push((player.id.clone(), 0));
    }
    // Latest death places best among the dead.
    for (slot, victim) in death_order.iter().rev().enumerate() {
        keyed.push((victim.clone(), slot as u32 + 1));
    }
    // Players who died outside the tracked order (should not happen) go last.
    for player in players.iter().filter(|p| !p.is_alive) {
        if !keyed.iter().any(|(id, _)| *id == player.id) {
            tracing::error!(player = player.id.as_str(), "Dead player missing from death order.");
            keyed.push((player.id.clone(), u32::MAX));
        }
    }
    keyed.sort_by_key(|(_, key)| *key);
    rank_sorted(&keyed)
}

/// Applies placement bonuses for a ranking and moves round points into totals.
/// Returns the score rows in ranking order.
pub fn award_and_transfer(players: &mut [Player], ranking: &[(String, u32)]) -> Vec<ScoreEntry> {
    let mut rows = Vec::with_capacity(ranking.len());
    for (id, rank) in ranking {
        let Some(player) = players.iter_mut().find(|p| p.id == *id) else {
            continue;
        };
        let bonus = placement_bonus(*rank, player.placement_bonus_override.as_deref());
        player.points += bonus;
        player.total_points += player.points;
        rows.push(ScoreEntry {
            player_id: player.id.clone(),
            name: player.name.clone(),
            number: player.number,
            points: player.points,
            total_points: player.total_points,
            rank: *rank,
        });
    }
    rows
}

/// The final ranking by cumulative points, best first.
pub fn ranked_by_total_points(players: &[Player]) -> Vec<ScoreEntry> {
    let mut keyed: Vec<(String, i64)> = players
        .iter()
        .map(|p| (p.id.clone(), -(p.total_points as i64)))
        .collect();
    keyed.sort_by_key(|(_, key)| *key);
    let ranking = rank_sorted(&keyed);
    ranking
        .into_iter()
        .filter_map(|(id, rank)| {
            players.iter().find(|p| p.id == id).map(|p| ScoreEntry {
                player_id: p.id.clone(),
                name: p.name.clone(),
                number: p.number,
                points: p.points,
                total_points: p.total_points,
                rank,
            })
        })
        .collect()
}

/// The player with the strictly highest total, if there is exactly one.
pub fn unique_leader(players: &[Player]) -> Option<String> {
    let best = players.iter().map(|p| p.total_points).max()?;
    let mut leaders = players.iter().filter(|p| p.total_points == best);
    let first = leaders.next()?;
    if leaders.next().is_some() { None } else { Some(first.id.clone()) }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rank_ties_share_the_lower_rank() {
        let sorted = vec![
            ("a".to_string(), 2u32),
            ("b".to_string(), 4),
            ("c".to_string(), 4),
            ("d".to_string(), 7),
        ];
        let ranks: Vec<u32> = rank_sorted(&sorted).into_iter().map(|(_, r)| r).collect();
        assert_eq!(ranks, vec![1, 2, 2, 4]);
    }

    #[test]
    fn placement_bonus_runs_out_after_the_table() {
        assert_eq!(placement_bonus(1, None), 5);
        assert_eq!(placement_bonus(2, None), 3);
        assert_eq!(placement_bonus(3, None), 1);
        assert_eq!(placement_bonus(4, None), 0);
        assert_eq!(placement_bonus(1, Some(&[9])), 9);
    }

    #[test]
    fn survival_ranking_rewards_late_deaths() {
        let mut players: Vec<Player> = (0..4)
            .map(|i| Player::new(format!("p{i}"), format!("P{i}"), i + 1))
            .collect();
        players[0].die(100.0);
        players[1].die(100.0);
        players[2].die(100.0);
        let death_order = vec!["p0".to_string(), "p1".to_string(), "p2".to_string()];
        let ranking = survival_ranking(&players, &death_order);
        assert_eq!(ranking[0], ("p3".to_string(), 1));
        assert_eq!(ranking[1], ("p2".to_string(), 2));
        assert_eq!(ranking[2], ("p1".to_string(), 3));
        assert_eq!(ranking[3], ("p0".to_string(), 4));
    }

    #[test]
    fn awards_follow_ranks_and_transfer_totals() {
        let mut players: Vec<Player> = (0..2)
            .map(|i| Player::new(format!("p{i}"), format!("P{i}"), i + 1))
            .collect();
        players[1].die(100.0);
        let ranking = survival_ranking(&players, &["p1".to_string()]);
        let rows = award_and_transfer(&mut players, &ranking);
        assert_eq!(rows[0].player_id, "p0");
        assert_eq!(rows[0].total_points, 5);
        assert_eq!(rows[1].total_points, 3);
    }

    #[test]
    fn unique_leader_requires_a_strict_maximum() {
        let mut players: Vec<Player> = (0..2)
            .map(|i| Player::new(format!("p{i}"), format!("P{i}"), i + 1))
            .collect();
        players[0].total_points = 5;
        players[1].total_points = 5;
        assert_eq!(unique_leader(&players), None);
        players[0].total_points = 6;
        assert_eq!(unique_leader(&players), Some("p0".to_string()));
    }
}
