//! Team bookkeeping: 2 to 4 color-coded teams, round-robin assignment on join,
//! cycling on request, and match points counted at team granularity.

use crate::player::Player;
use protocol::TeamScoreEntry;
use rand::RngCore;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, HashMap};

/// The static team palette. Team ids index into it.
pub const TEAM_PALETTE: &[(&str, &str)] = &[
    ("Red", "#e74c3c"),
    ("Blue", "#3498db"),
    ("Green", "#2ecc71"),
    ("Yellow", "#f1c40f"),
];

#[derive(Clone, Debug)]
pub struct Team {
    pub id: u32,
    pub name: &'static str,
    pub color: &'static str,
}

/// Registry of the active teams and their match points. Empty while teams are off.
#[derive(Default, Debug)]
pub struct TeamRegistry {
    teams: Vec<Team>,
    match_points: HashMap<u32, u32>,
}

impl TeamRegistry {
    /// (Re)builds the team set. Counts beyond the palette are capped.
    pub fn configure(&mut self, count: u32) {
        let count = (count as usize).min(TEAM_PALETTE.len());
        self.teams = (0..count)
            .map(|i| Team {
                id: i as u32,
                name: TEAM_PALETTE[i].0,
                color: TEAM_PALETTE[i].1,
            })
            .collect();
        self.match_points.clear();
    }

    pub fn disable(&mut self) {
        self.teams.clear();
        self.match_points.clear();
    }

    pub fn is_enabled(&self) -> bool {
        !self.teams.is_empty()
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn team(&self, id: u32) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == id)
    }

    pub fn team_ids(&self) -> Vec<u32> {
        self.teams.iter().map(|t| t.id).collect()
    }

    /// The team a joining player lands on: the one with the fewest members.
    pub fn next_team_for_join(&self, players: &[Player]) -> Option<u32> {
        if self.teams.is_empty() {
            return None;
        }
        self.teams
            .iter()
            .map(|t| {
                let members = players.iter().filter(|p| p.team_id == Some(t.id)).count();
                (members, t.id)
            })
            .min()
            .map(|(_, id)| id)
    }

    /// The next team in the cycle for a manual switch.
    pub fn next_team_after(&self, current: Option<u32>) -> Option<u32> {
        if self.teams.is_empty() {
            return None;
        }
        let next = match current {
            None => 0,
            Some(id) => {
                let at = self.teams.iter().position(|t| t.id == id).unwrap_or(0);
                (at + 1) % self.teams.len()
            }
        };
        Some(self.teams[next].id)
    }

    /// Random re-assignment keeping team sizes balanced.
    pub fn shuffle(&mut self, players: &mut [Player], rng: &mut dyn RngCore) {
        if self.teams.is_empty() {
            return;
        }
        let mut order: Vec<usize> = (0..players.len()).collect();
        order.shuffle(rng);
        for (slot, player_idx) in order.into_iter().enumerate() {
            players[player_idx].team_id = Some(self.teams[slot % self.teams.len()].id);
        }
    }

    pub fn add_points(&mut self, team_id: u32, points: u32) {
        *self.match_points.entry(team_id).or_insert(0) += points;
    }

    pub fn points(&self, team_id: u32) -> u32 {
        self.match_points.get(&team_id).copied().unwrap_or(0)
    }

    pub fn clear_points(&mut self) {
        self.match_points.clear();
    }

    pub fn score_entries(&self) -> Vec<TeamScoreEntry> {
        self.teams
            .iter()
            .map(|t| TeamScoreEntry {
                team_id: t.id,
                team_name: t.name.into(),
                team_color: t.color.into(),
                score: self.points(t.id),
            })
            .collect()
    }

    /// The `team:update` payload: player id to team id for every teamed player.
    pub fn assignment_map(&self, players: &[Player]) -> BTreeMap<String, u32> {
        players
            .iter()
            .filter_map(|p| p.team_id.map(|t| (p.id.clone(), t)))
            .collect()
    }
}
