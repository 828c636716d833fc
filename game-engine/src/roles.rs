//! The role framework: a kind tag plus per-kind state on each player, with the
//! cross-player hooks dispatched at engine level. Cross-role reactions (the hunter
//! scoring on the beast's death, the executioner on its target's) are id-keyed
//! subscriptions resolved here and deregistered once they fire or their owner dies.

use crate::error::Rejection;
use crate::outbound::OutboundQueue;
use crate::player::Player;
use protocol::{RoleInfo, ServerMessage};
use rand::Rng;
use rand::RngCore;

pub const VAMPIRE_BLOODLUST_COOLDOWN_MS: u64 = 30_000;
pub const VAMPIRE_BLOODLUST_DURATION_MS: u64 = 5_000;
pub const VAMPIRE_BLOODLUST_POINTS: u32 = 5;
pub const BEAST_TOUGHNESS: f64 = 2.0;
pub const BEAST_HUNTER_POINTS: u32 = 3;
pub const EXECUTIONER_POINTS: u32 = 4;
pub const ANGEL_CHARGES: u32 = 1;
pub const ANGEL_COOLDOWN_MS: u64 = 20_000;

/// Every role the engine knows.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RoleKind {
    /// The plain no-ability role used to pad pools.
    Survivor,
    Vampire,
    Beast,
    BeastHunter,
    Executioner,
    Angel,
}

/// Static per-role metadata.
pub struct RoleMeta {
    pub key: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub difficulty: u32,
    /// Tick order tiebreaker, higher first.
    pub priority: i32,
    pub has_ability: bool,
}

impl RoleKind {
    pub fn metadata(self) -> RoleMeta {
        match self {
            RoleKind::Survivor => RoleMeta {
                key: "survivor",
                display_name: "Survivor",
                description: "Stay still, stay alive, outlast everyone.",
                difficulty: 1,
                priority: 0,
                has_ability: false,
            },
            RoleKind::Vampire => RoleMeta {
                key: "vampire",
                display_name: "Vampire",
                description: "Periodic bloodlust: someone must die while it lasts, or you do.",
                difficulty: 3,
                priority: 50,
                has_ability: false,
            },
            RoleKind::Beast => RoleMeta {
                key: "beast",
                display_name: "Beast",
                description: "Twice as tough as the others, and hunted.",
                difficulty: 1,
                priority: 40,
                has_ability: false,
            },
            RoleKind::BeastHunter => RoleMeta {
                key: "beast-hunter",
                display_name: "Beast Hunter",
                description: "Earn points when the beast falls while you still stand.",
                difficulty: 2,
                priority: 30,
                has_ability: false,
            },
            RoleKind::Executioner => RoleMeta {
                key: "executioner",
                display_name: "Executioner",
                description: "A secret target is chosen for you. Outlive their death.",
                difficulty: 2,
                priority: 20,
                has_ability: false,
            },
            RoleKind::Angel => RoleMeta {
                key: "angel",
                display_name: "Angel",
                description: "Tap to bless yourself against one death.",
                difficulty: 1,
                priority: 10,
                has_ability: true,
            },
        }
    }

    pub fn from_key(key: &str) -> Option<RoleKind> {
        match key {
            "survivor" => Some(RoleKind::Survivor),
            "vampire" => Some(RoleKind::Vampire),
            "beast" => Some(RoleKind::Beast),
            "beast-hunter" => Some(RoleKind::BeastHunter),
            "executioner" => Some(RoleKind::Executioner),
            "angel" => Some(RoleKind::Angel),
            _ => None,
        }
    }
}

/// Kind-specific running state.
#[derive(Clone, Debug)]
pub enum RoleData {
    None,
    Vampire { active: bool, next_at: u64, ends_at: u64 },
}

/// The role-level slice of a player.
#[derive(Clone, Debug)]
pub struct RoleState {
    pub kind: RoleKind,
    pub target_player_id: Option<String>,
    pub target_player_name: Option<String>,
    pub max_charges: u32,
    pub current_charges: u32,
    pub cooldown_duration_ms: u64,
    pub cooldown_remaining_ms: u64,
    pub data: RoleData,
}

impl RoleState {
    /// Role init: charges, cooldowns and per-kind state for a fresh round.
    pub fn new(kind: RoleKind) -> Self {
        let (max_charges, cooldown) = match kind {
            RoleKind::Angel => (ANGEL_CHARGES, ANGEL_COOLDOWN_MS),
            _ => (0, 0),
        };
        let data = match kind {
            RoleKind::Vampire => RoleData::Vampire {
                active: false,
                next_at: VAMPIRE_BLOODLUST_COOLDOWN_MS,
                ends_at: 0,
            },
            _ => RoleData::None,
        };
        RoleState {
            kind,
            target_player_id: None,
            target_player_name: None,
            max_charges,
            current_charges: max_charges,
            cooldown_duration_ms: cooldown,
            cooldown_remaining_ms: 0,
            data,
        }
    }

    /// The briefing payload for `role:assigned` / `role:updated`.
    pub fn info(&self, target_number: Option<u32>) -> RoleInfo {
        let meta = self.kind.metadata();
        RoleInfo {
            name: meta.key.into(),
            display_name: meta.display_name.into(),
            description: meta.description.into(),
            difficulty: meta.difficulty,
            target_name: self.target_player_name.clone(),
            target_number,
        }
    }
}

/// Expands a theme's base pool to `n` players by cycling, like dealing from a
/// repeating deck, then truncating.
pub fn role_pool_for_theme(theme: &str, n: usize) -> Vec<RoleKind> {
    let base: &[RoleKind] = match theme {
        "gothic" => &[
            RoleKind::Vampire,
            RoleKind::BeastHunter,
            RoleKind::Beast,
            RoleKind::Angel,
            RoleKind::Executioner,
            RoleKind::Survivor,
        ],
        _ => &[RoleKind::Survivor],
    };
    (0..n).map(|i| base[i % base.len()]).collect()
}

/// Pre-round setup for target-picking roles. Runs before assignments are announced.
pub fn assign_targets(players: &mut [Player], rng: &mut dyn RngCore) {
    let candidates: Vec<(String, String)> = players
        .iter()
        .map(|p| (p.id.clone(), p.name.clone()))
        .collect();
    for idx in 0..players.len() {
        if players[idx].role.kind != RoleKind::Executioner {
            continue;
        }
        let own_id = players[idx].id.clone();
        let others: Vec<(String, String)> = candidates
            .iter()
            .filter(|(id, _)| *id != own_id)
            .cloned()
            .collect();
        if others.is_empty() {
            continue;
        }
        let (target_id, target_name) = others[rng.gen_range(0..others.len())].clone();
        players[idx].role.target_player_id = Some(target_id);
        players[idx].role.target_player_name = Some(target_name);
    }
}

/// Per-tick role behavior. Returns the ids of players the role logic kills this
/// tick (the vampire whose bloodlust found no victim); the engine runs the actual
/// death sequence so mode hooks and listeners see it like any other death.
pub fn tick_roles(players: &mut [Player], now: u64, queue: &mut OutboundQueue) -> Vec<String> {
    let mut kills = Vec::new();
    for player in players.iter_mut() {
        if !player.is_alive {
            continue;
        }
        if let RoleData::Vampire { active, next_at, ends_at } = &mut player.role.data {
            if !*active && now >= *next_at {
                *active = true;
                *ends_at = now + VAMPIRE_BLOODLUST_DURATION_MS;
                queue.broadcast(ServerMessage::VampireBloodlust {
                    vampire_id: player.id.clone(),
                    vampire_name: player.name.clone(),
                    vampire_number: player.number,
                    active: true,
                });
            } else if *active && now >= *ends_at {
                // Nobody died in time. The thirst wins.
                *active = false;
                *next_at = now + VAMPIRE_BLOODLUST_COOLDOWN_MS;
                queue.broadcast(ServerMessage::VampireBloodlust {
                    vampire_id: player.id.clone(),
                    vampire_name: player.name.clone(),
                    vampire_number: player.number,
                    active: false,
                });
                kills.push(player.id.clone());
            }
        }
    }
    kills
}

/// Death fan-out to every listening role. Runs after the victim is marked dead.
pub fn on_player_death(players: &mut [Player], victim_id: &str, now: u64, queue: &mut OutboundQueue) {
    let victim_kind = players
        .iter()
        .find(|p| p.id == victim_id)
        .map(|p| p.role.kind);
    for player in players.iter_mut() {
        if player.id == victim_id || !player.is_alive {
            continue;
        }
        match player.role.kind {
            RoleKind::Vampire => {
                if let RoleData::Vampire { active, next_at, .. } = &mut player.role.data {
                    if *active {
                        *active = false;
                        *next_at = now + VAMPIRE_BLOODLUST_COOLDOWN_MS;
                        player.points += VAMPIRE_BLOODLUST_POINTS;
                        queue.broadcast(ServerMessage::VampireBloodlust {
                            vampire_id: player.id.clone(),
                            vampire_name: player.name.clone(),
                            vampire_number: player.number,
                            active: false,
                        });
                    }
                }
            }
            RoleKind::BeastHunter => {
                if victim_kind == Some(RoleKind::Beast) {
                    player.points += BEAST_HUNTER_POINTS;
                }
            }
            RoleKind::Executioner => {
                if player.role.target_player_id.as_deref() == Some(victim_id) {
                    player.points += EXECUTIONER_POINTS;
                    // The contract is fulfilled, stop listening.
                    player.role.target_player_id = None;
                    player.role.target_player_name = None;
                    queue.to_player(player.id.clone(), ServerMessage::RoleUpdated(player.role.info(None)));
                }
            }
            _ => {}
        }
    }
}

/// The role-specific part of an ability use. Charge bookkeeping happens in the
/// caller; a `false` return refunds the spent charge.
pub fn on_ability_use(player: &mut Player, now: u64) -> bool {
    match player.role.kind {
        RoleKind::Angel => {
            player.apply_effect(crate::effects::EffectKind::Blessed, None, None, now);
            true
        }
        _ => false,
    }
}

/// Whether the role has a tap ability at all.
pub fn has_ability(kind: RoleKind) -> bool {
    kind.metadata().has_ability
}

/// Ability entry point implementing the charge contract.
pub fn use_ability(player: &mut Player, now: u64) -> Result<(), Rejection> {
    if !has_ability(player.role.kind) {
        return Err(Rejection::NoAbility);
    }
    if player.role.current_charges == 0 {
        return Err(Rejection::NoCharges);
    }
    player.role.current_charges -= 1;
    if player.role.cooldown_remaining_ms == 0 {
        player.role.cooldown_remaining_ms = player.role.cooldown_duration_ms;
    }
    if on_ability_use(player, now) {
        Ok(())
    } else {
        // Refund, the role hook declined.
        player.role.current_charges += 1;
        Err(Rejection::AbilityFailed)
    }
}
