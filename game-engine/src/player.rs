//! The per-player model: movement smoothing into intensity into damage, the status
//! effect carrier, charge regeneration, the damage burst debouncer and the
//! respawn-friendly reset. Cross-player consequences are returned to the engine as
//! outcome values, never applied reentrantly.

use crate::effects::{EffectKind, EffectTickAction, StatusEffect, effective_toughness};
use crate::movement::{AccelSample, MovementConfig, MovementWindow};
use crate::roles::{RoleKind, RoleState};
use protocol::{EffectSnapshot, PlayerSnapshot};

/// Ticks without fresh damage after which one damage burst event fires.
const DAMAGE_BURST_QUIET_TICKS: u32 = 3;

/// What a damage application ended in.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct DamageOutcome {
    /// The death sequence ran to completion.
    pub died: bool,
    /// A status effect vetoed the death.
    pub death_prevented: bool,
}

/// What a player tick produced.
#[derive(Clone, Debug, Default)]
pub struct PlayerTickOutcome {
    /// An effect (Excited stillness) demands this player's death.
    pub effect_kill: bool,
    /// A damage burst just ended, with its total.
    pub damage_burst: Option<f64>,
}

/// One participant, long-lived across rounds within a game.
#[derive(Clone, Debug)]
pub struct Player {
    pub id: String,
    pub name: String,
    /// 1-based display number, stable until permanent removal.
    pub number: u32,
    pub is_alive: bool,
    pub is_ready: bool,
    /// Game time of an in-game disconnect, none while connected.
    pub disconnected_at: Option<u64>,
    pub connected: bool,
    window: MovementWindow,
    pub last_intensity: f64,
    pub accumulated_damage: f64,
    /// Role-level base value; effects scale or override it, see [`Self::toughness`].
    pub base_toughness: f64,
    /// Points earned in the current round.
    pub points: u32,
    /// Cumulative points across rounds.
    pub total_points: u32,
    /// Deaths in the current round.
    pub death_count: u32,
    /// Per-player override of the mode's placement bonus vector.
    pub placement_bonus_override: Option<Vec<u32>>,
    /// Players sharing a non-null tag may win a round together.
    pub victory_group_id: Option<String>,
    pub team_id: Option<u32>,
    effects: Vec<StatusEffect>,
    pub role: RoleState,
    burst_damage: f64,
    quiet_ticks: u32,
}

impl Player {
    pub fn new(id: String, name: String, number: u32) -> Self {
        Player {
            id,
            name,
            number,
            is_alive: true,
            is_ready: false,
            disconnected_at: None,
            connected: true,
            window: MovementWindow::default(),
            last_intensity: 0.0,
            accumulated_damage: 0.0,
            base_toughness: 1.0,
            points: 0,
            total_points: 0,
            death_count: 0,
            placement_bonus_override: None,
            victory_group_id: None,
            team_id: None,
            effects: Vec::new(),
            role: RoleState::new(RoleKind::Survivor),
            burst_damage: 0.0,
            quiet_ticks: 0,
        }
    }

    /// Installs a role and its init-time consequences.
    pub fn assign_role(&mut self, kind: RoleKind) {
        self.role = RoleState::new(kind);
        self.base_toughness = match kind {
            RoleKind::Beast => crate::roles::BEAST_TOUGHNESS,
            _ => 1.0,
        };
    }

    /// Fresh state for a new round. Connection status and totals survive.
    pub fn reset_for_round(&mut self) {
        self.is_alive = true;
        self.is_ready = false;
        self.accumulated_damage = 0.0;
        self.points = 0;
        self.death_count = 0;
        self.victory_group_id = None;
        self.placement_bonus_override = None;
        self.last_intensity = 0.0;
        self.window.clear();
        self.effects.clear();
        self.burst_damage = 0.0;
        self.quiet_ticks = 0;
    }

    // ---- status effects ----

    /// Applies an effect, or refreshes the existing instance of that kind.
    /// The effect list stays sorted by descending priority.
    pub fn apply_effect(
        &mut self,
        kind: EffectKind,
        duration_ms: Option<u64>,
        magnitude: Option<f64>,
        now: u64,
    ) {
        if let Some(existing) = self.effects.iter_mut().find(|e| e.kind == kind) {
            existing.refresh(now, duration_ms, magnitude);
            return;
        }
        let effect = StatusEffect::new(kind, now, duration_ms, magnitude);
        let at = self
            .effects
            .iter()
            .position(|e| e.kind.priority() < kind.priority())
            .unwrap_or(self.effects.len());
        self.effects.insert(at, effect);
    }

    pub fn remove_effect(&mut self, kind: EffectKind) -> bool {
        let before = self.effects.len();
        self.effects.retain(|e| e.kind != kind);
        self.effects.len() != before
    }

    pub fn clear_status_effects(&mut self) {
        self.effects.clear();
    }

    pub fn has_effect(&self, kind: EffectKind) -> bool {
        self.effects.iter().any(|e| e.kind == kind)
    }

    pub fn effects(&self) -> &[StatusEffect] {
        &self.effects
    }

    pub fn is_invulnerable(&self) -> bool {
        self.has_effect(EffectKind::Invulnerability)
    }

    /// The live divisor for incoming damage.
    pub fn toughness(&self) -> f64 {
        effective_toughness(self.base_toughness, &self.effects)
    }

    // ---- movement and damage ----

    /// Feeds one accelerometer sample. Silently ignored while dead; the engine
    /// additionally gates on the active phase before calling.
    pub fn update_movement(
        &mut self,
        sample: AccelSample,
        now: u64,
        config: &MovementConfig,
    ) -> DamageOutcome {
        if !self.is_alive {
            return DamageOutcome::default();
        }
        self.window.push(sample.magnitude(), config.history_size);
        let intensity = self.window.intensity(config.smoothing_enabled);
        self.last_intensity = intensity;
        for effect in self.effects.iter_mut() {
            effect.on_movement(intensity, now);
        }
        self.check_movement_damage(intensity, now, config)
    }

    /// Reads the live danger threshold so mid-round shifts apply immediately.
    pub fn check_movement_damage(
        &mut self,
        intensity: f64,
        now: u64,
        config: &MovementConfig,
    ) -> DamageOutcome {
        if intensity <= config.danger_threshold {
            return DamageOutcome::default();
        }
        let damage = if config.oneshot_mode {
            config.death_threshold
        } else {
            (intensity - config.danger_threshold) * config.damage_multiplier
        };
        self.take_damage(damage, now, config)
    }

    /// The damage pipeline: effects first (descending priority, short-circuit at
    /// zero), then the toughness divisor, then accumulation and the death check.
    pub fn take_damage(&mut self, base: f64, now: u64, config: &MovementConfig) -> DamageOutcome {
        if !self.is_alive || base <= 0.0 {
            return DamageOutcome::default();
        }
        let mut damage = base;
        for effect in self.effects.iter_mut() {
            damage = effect.modify_incoming_damage(damage);
            if damage <= 0.0 {
                return DamageOutcome::default();
            }
        }
        damage /= self.toughness();
        self.accumulated_damage += damage;
        self.burst_damage += damage;
        self.quiet_ticks = 0;

        if self.accumulated_damage >= config.death_threshold && !self.is_invulnerable() {
            self.before_death(config)
        } else {
            DamageOutcome::default()
        }
    }

    /// Offers every effect the death veto; the first one wins and is consumed.
    pub fn before_death(&mut self, config: &MovementConfig) -> DamageOutcome {
        if let Some(at) = self.effects.iter().position(|e| e.prevents_death()) {
            if self.effects[at].consumed_on_prevent() {
                self.effects.remove(at);
            }
            self.accumulated_damage = 0.0;
            return DamageOutcome { died: false, death_prevented: true };
        }
        self.die(config.death_threshold);
        DamageOutcome { died: true, death_prevented: false }
    }

    /// Idempotent. Freezes accumulated damage at the death threshold and drops
    /// all status effects. The engine emits the death event and runs the role
    /// and mode fan-out.
    pub fn die(&mut self, death_threshold: f64) -> bool {
        if !self.is_alive {
            return false;
        }
        self.is_alive = false;
        self.accumulated_damage = death_threshold;
        self.death_count += 1;
        self.effects.clear();
        self.burst_damage = 0.0;
        self.quiet_ticks = 0;
        true
    }

    /// Revives with a clean slate; vulnerable immediately.
    pub fn respawn(&mut self) {
        self.is_alive = true;
        self.accumulated_damage = 0.0;
        self.effects.clear();
        self.window.clear();
        self.last_intensity = 0.0;
        self.burst_damage = 0.0;
        self.quiet_ticks = 0;
    }

    // ---- ticking ----

    /// One engine tick: effect ticks and expiry, charge regeneration, and the
    /// damage burst debouncer.
    pub fn on_tick(&mut self, now: u64, dt: u64) -> PlayerTickOutcome {
        let mut outcome = PlayerTickOutcome::default();
        if self.is_alive {
            let mut heal = 0.0;
            for effect in self.effects.iter_mut() {
                match effect.tick(now, dt) {
                    EffectTickAction::None => {}
                    EffectTickAction::Heal(amount) => heal += amount,
                    EffectTickAction::KillOwner => outcome.effect_kill = true,
                }
            }
            if heal > 0.0 {
                self.accumulated_damage = (self.accumulated_damage - heal).max(0.0);
            }
            self.effects.retain(|e| !e.should_expire(now));
        }

        self.regen_charges(dt);

        if self.burst_damage > 0.0 {
            self.quiet_ticks += 1;
            if self.quiet_ticks >= DAMAGE_BURST_QUIET_TICKS {
                outcome.damage_burst = Some(self.burst_damage);
                self.burst_damage = 0.0;
                self.quiet_ticks = 0;
            }
        }
        outcome
    }

    /// One charge back per cooldown period while below the maximum.
    fn regen_charges(&mut self, dt: u64) {
        let role = &mut self.role;
        if role.current_charges >= role.max_charges {
            role.cooldown_remaining_ms = 0;
            return;
        }
        role.cooldown_remaining_ms = role.cooldown_remaining_ms.saturating_sub(dt);
        if role.cooldown_remaining_ms == 0 {
            role.current_charges += 1;
            if role.current_charges < role.max_charges {
                role.cooldown_remaining_ms = role.cooldown_duration_ms;
            }
        }
    }

    // ---- connection ----

    pub fn mark_disconnected(&mut self, game_now: u64) {
        self.connected = false;
        self.disconnected_at = Some(game_now);
    }

    pub fn mark_connected(&mut self) {
        self.connected = true;
        self.disconnected_at = None;
    }

    pub fn is_disconnected_beyond_grace(&self, game_now: u64, grace_ms: u64) -> bool {
        match self.disconnected_at {
            Some(at) => game_now.saturating_sub(at) >= grace_ms,
            None => false,
        }
    }

    /// Alive for win-condition purposes: actually alive and either connected or
    /// still within the disconnect grace window.
    pub fn is_effectively_alive(&self, game_now: u64, grace_ms: u64) -> bool {
        self.is_alive && !self.is_disconnected_beyond_grace(game_now, grace_ms)
    }

    pub fn snapshot(&self, game_now: u64, grace_ms: u64) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            number: self.number,
            is_alive: self.is_alive,
            accumulated_damage: self.accumulated_damage,
            points: self.points,
            total_points: self.total_points,
            toughness: self.toughness(),
            death_count: self.death_count,
            team_id: self.team_id,
            is_disconnected: !self.connected,
            grace_time_remaining: self
                .disconnected_at
                .map(|at| grace_ms.saturating_sub(game_now.saturating_sub(at))),
            status_effects: self
                .effects
                .iter()
                .map(|e| EffectSnapshot {
                    effect_type: e.kind.wire_name().into(),
                    end_time: e.end_time,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config() -> MovementConfig {
        MovementConfig {
            danger_threshold: 0.1,
            damage_multiplier: 50.0,
            death_threshold: 100.0,
            history_size: 5,
            smoothing_enabled: false,
            oneshot_mode: false,
        }
    }

    fn player() -> Player {
        Player::new("p1".into(), "Ada".into(), 1)
    }

    fn full_swing(t: u64) -> AccelSample {
        AccelSample { x: 10.0, y: 10.0, z: 10.0, timestamp: t }
    }

    #[test]
    fn movement_above_threshold_accumulates_damage() {
        let mut p = player();
        let cfg = config();
        let outcome = p.update_movement(full_swing(0), 0, &cfg);
        assert!(!outcome.died);
        // (1.0 - 0.1) * 50 = 45.
        assert!((p.accumulated_damage - 45.0).abs() < 1e-9);
        assert!((p.last_intensity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn three_full_swings_kill() {
        let mut p = player();
        let cfg = config();
        assert!(!p.update_movement(full_swing(0), 0, &cfg).died);
        assert!(!p.update_movement(full_swing(100), 100, &cfg).died);
        let outcome = p.update_movement(full_swing(200), 200, &cfg);
        assert!(outcome.died);
        assert!(!p.is_alive);
        // Frozen at the death threshold.
        assert_eq!(p.accumulated_damage, 100.0);
        // Dead players ignore further samples.
        p.update_movement(full_swing(300), 300, &cfg);
        assert_eq!(p.accumulated_damage, 100.0);
    }

    #[test]
    fn oneshot_mode_is_instantly_lethal() {
        let mut p = player();
        let mut cfg = config();
        cfg.oneshot_mode = true;
        assert!(p.update_movement(full_swing(0), 0, &cfg).died);
    }

    #[test]
    fn invulnerable_players_take_no_damage() {
        let mut p = player();
        let cfg = config();
        p.apply_effect(EffectKind::Invulnerability, None, None, 0);
        for t in 0..5u64 {
            p.take_damage(50.0, t * 100, &cfg);
        }
        assert_eq!(p.accumulated_damage, 0.0);
        assert!(p.is_alive);
    }

    #[test]
    fn shield_property_total_leakage() {
        // Sum of damage reaching the accumulator equals max(0, sum - capacity).
        let mut p = player();
        let cfg = config();
        p.apply_effect(EffectKind::Shielded, None, Some(60.0), 0);
        for _ in 0..4 {
            p.take_damage(20.0, 0, &cfg);
        }
        assert!((p.accumulated_damage - 20.0).abs() < 1e-9);
    }

    #[test]
    fn blessed_consumes_itself_to_prevent_one_death() {
        let mut p = player();
        let cfg = config();
        p.apply_effect(EffectKind::Blessed, None, None, 0);
        let outcome = p.take_damage(500.0, 0, &cfg);
        assert!(outcome.death_prevented);
        assert!(p.is_alive);
        assert!(!p.has_effect(EffectKind::Blessed));
        assert_eq!(p.accumulated_damage, 0.0);
        // The second lethal hit goes through.
        assert!(p.take_damage(500.0, 100, &cfg).died);
    }

    #[test]
    fn toughness_divides_incoming_damage() {
        let mut p = player();
        let cfg = config();
        p.base_toughness = 2.0;
        p.take_damage(50.0, 0, &cfg);
        assert!((p.accumulated_damage - 25.0).abs() < 1e-9);
    }

    #[test]
    fn stunned_multiplies_before_toughness() {
        let mut p = player();
        let cfg = config();
        p.apply_effect(EffectKind::Stunned, Some(5000), None, 0);
        p.take_damage(4.0, 0, &cfg);
        assert!((p.accumulated_damage - 20.0).abs() < 1e-9);
    }

    #[test]
    fn reapplication_refreshes_instead_of_stacking() {
        let mut p = player();
        p.apply_effect(EffectKind::Stunned, Some(1000), None, 0);
        p.apply_effect(EffectKind::Stunned, Some(1000), None, 500);
        assert_eq!(p.effects().len(), 1);
        assert_eq!(p.effects()[0].end_time, Some(1500));
    }

    #[test]
    fn effects_are_ordered_by_descending_priority() {
        let mut p = player();
        p.apply_effect(EffectKind::Excited, None, None, 0);
        p.apply_effect(EffectKind::Invulnerability, None, None, 0);
        p.apply_effect(EffectKind::Shielded, None, None, 0);
        let kinds: Vec<EffectKind> = p.effects().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EffectKind::Invulnerability, EffectKind::Shielded, EffectKind::Excited]
        );
    }

    #[test]
    fn die_is_idempotent() {
        let mut p = player();
        assert!(p.die(100.0));
        assert!(!p.die(100.0));
        assert_eq!(p.death_count, 1);
    }

    #[test]
    fn damage_burst_fires_after_three_quiet_ticks() {
        let mut p = player();
        let cfg = config();
        p.take_damage(10.0, 0, &cfg);
        assert!(p.on_tick(100, 100).damage_burst.is_none());
        // Fresh damage resets the quiet counter.
        p.take_damage(5.0, 150, &cfg);
        assert!(p.on_tick(200, 100).damage_burst.is_none());
        assert!(p.on_tick(300, 100).damage_burst.is_none());
        let outcome = p.on_tick(400, 100);
        assert_eq!(outcome.damage_burst, Some(15.0));
        // One event per burst.
        assert!(p.on_tick(500, 100).damage_burst.is_none());
    }

    #[test]
    fn regenerating_removes_damage_over_ticks() {
        let mut p = player();
        let cfg = config();
        p.take_damage(30.0, 0, &cfg);
        p.apply_effect(EffectKind::Regenerating, Some(10_000), Some(20.0), 0);
        for t in 1..=5u64 {
            p.on_tick(t * 100, 100);
        }
        // 5 ticks * 2 damage healed per tick.
        assert!((p.accumulated_damage - 20.0).abs() < 1e-9);
    }

    #[test]
    fn excited_stillness_requests_a_kill() {
        let mut p = player();
        p.apply_effect(EffectKind::Excited, None, None, 0);
        assert!(!p.on_tick(1900, 100).effect_kill);
        assert!(p.on_tick(2000, 100).effect_kill);
    }

    #[test]
    fn charge_regen_honours_the_cooldown() {
        let mut p = player();
        p.assign_role(RoleKind::Angel);
        crate::roles::use_ability(&mut p, 0).unwrap();
        assert_eq!(p.role.current_charges, 0);
        for t in 1..=199u64 {
            p.on_tick(t * 100, 100);
        }
        assert_eq!(p.role.current_charges, 0);
        p.on_tick(20_000, 100);
        assert_eq!(p.role.current_charges, 1);
        assert_eq!(p.role.cooldown_remaining_ms, 0);
    }

    #[test]
    fn charges_never_exceed_the_maximum() {
        let mut p = player();
        p.assign_role(RoleKind::Angel);
        for t in 0..500u64 {
            p.on_tick(t * 100, 100);
            assert!(p.role.current_charges <= p.role.max_charges);
        }
    }

    #[test]
    fn grace_window_bounds_effective_aliveness() {
        let mut p = player();
        p.mark_disconnected(5000);
        assert!(p.is_effectively_alive(14_999, 10_000));
        assert!(!p.is_effectively_alive(15_000, 10_000));
        p.mark_connected();
        assert!(p.is_effectively_alive(20_000, 10_000));
    }

    #[test]
    fn respawn_restores_a_vulnerable_clean_slate() {
        let mut p = player();
        let cfg = config();
        p.apply_effect(EffectKind::Shielded, None, None, 0);
        p.take_damage(500.0, 0, &cfg);
        p.die(100.0);
        p.respawn();
        assert!(p.is_alive);
        assert_eq!(p.accumulated_damage, 0.0);
        assert!(p.effects().is_empty());
        assert!(p.take_damage(500.0, 100, &cfg).died);
    }

    #[test]
    fn smoothed_intensity_uses_the_window_mean() {
        let mut p = player();
        let mut cfg = config();
        cfg.smoothing_enabled = true;
        let still = AccelSample { x: 0.0, y: 0.0, z: 0.0, timestamp: 0 };
        p.update_movement(still, 0, &cfg);
        p.update_movement(full_swing(100), 100, &cfg);
        // Mean of one full and one zero magnitude sample.
        assert!((p.last_intensity - 0.5).abs() < 1e-9);
    }
}
