//! The status effect framework: typed effect kinds with a static priority table and
//! match-dispatched lifecycle hooks. A player carries at most one instance per kind;
//! reapplication refreshes the existing instance.

/// Intensity below this does not count as movement for the Excited effect.
const EXCITED_MOVE_EPSILON: f64 = 0.05;

/// Milliseconds of stillness after which Excited kills its carrier.
const EXCITED_STILLNESS_MS: u64 = 2000;

/// Every effect kind the engine knows.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EffectKind {
    /// Blocks all incoming damage.
    Invulnerability,
    /// Consumes itself to prevent one death.
    Blessed,
    /// Multiplies incoming damage.
    Stunned,
    /// Absorbs damage up to its capacity, then overflows.
    Shielded,
    /// Multiplies toughness up.
    Strengthened,
    /// Multiplies toughness down.
    Weakened,
    /// Sets toughness to an absolute value for its duration.
    Toughened,
    /// Removes accumulated damage at a fixed rate.
    Regenerating,
    /// Kills the carrier after prolonged stillness.
    Excited,
}

impl EffectKind {
    /// Hook invocation order on a player is by descending priority.
    pub fn priority(self) -> i32 {
        match self {
            EffectKind::Invulnerability => 100,
            EffectKind::Blessed => 95,
            EffectKind::Stunned => 90,
            EffectKind::Shielded => 80,
            EffectKind::Strengthened => 60,
            EffectKind::Weakened => 50,
            EffectKind::Toughened => 50,
            EffectKind::Regenerating => 20,
            EffectKind::Excited => 10,
        }
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            EffectKind::Invulnerability => "invulnerability",
            EffectKind::Blessed => "blessed",
            EffectKind::Stunned => "stunned",
            EffectKind::Shielded => "shielded",
            EffectKind::Strengthened => "strengthened",
            EffectKind::Weakened => "weakened",
            EffectKind::Toughened => "toughened",
            EffectKind::Regenerating => "regenerating",
            EffectKind::Excited => "excited",
        }
    }

    /// Magnitude used when the caller does not supply one.
    pub fn default_magnitude(self) -> f64 {
        match self {
            EffectKind::Stunned => 5.0,
            EffectKind::Shielded => 50.0,
            EffectKind::Strengthened => 2.0,
            EffectKind::Weakened => 0.5,
            EffectKind::Toughened => 2.0,
            EffectKind::Regenerating => 10.0,
            _ => 1.0,
        }
    }
}

/// Kind-specific running state.
#[derive(Clone, Debug)]
pub enum EffectData {
    Plain,
    Shield { remaining: f64 },
    Excited { last_movement_at: u64 },
}

/// What an effect wants done to its carrier after a tick.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum EffectTickAction {
    None,
    /// Remove this much accumulated damage.
    Heal(f64),
    /// The carrier dies (e.g. Excited stillness).
    KillOwner,
}

/// One live effect instance on a player.
#[derive(Clone, Debug)]
pub struct StatusEffect {
    pub kind: EffectKind,
    pub applied_at: u64,
    /// Game time when the effect runs out; none means until explicitly removed.
    pub end_time: Option<u64>,
    pub magnitude: f64,
    pub data: EffectData,
}

impl StatusEffect {
    pub fn new(kind: EffectKind, now: u64, duration_ms: Option<u64>, magnitude: Option<f64>) -> Self {
        let magnitude = magnitude.unwrap_or_else(|| kind.default_magnitude());
        let data = match kind {
            EffectKind::Shielded => EffectData::Shield { remaining: magnitude },
            EffectKind::Excited => EffectData::Excited { last_movement_at: now },
            _ => EffectData::Plain,
        };
        StatusEffect {
            kind,
            applied_at: now,
            end_time: duration_ms.map(|d| now + d),
            magnitude,
            data,
        }
    }

    /// Reapplication semantics: keep this instance, refresh its clock and strength.
    pub fn refresh(&mut self, now: u64, duration_ms: Option<u64>, magnitude: Option<f64>) {
        self.applied_at = now;
        self.end_time = duration_ms.map(|d| now + d);
        if let Some(m) = magnitude {
            self.magnitude = m;
        }
        match &mut self.data {
            EffectData::Shield { remaining } => *remaining = self.magnitude,
            EffectData::Excited { last_movement_at } => *last_movement_at = now,
            EffectData::Plain => {}
        }
    }

    /// The damage pipeline hook. Called in descending priority order.
    pub fn modify_incoming_damage(&mut self, damage: f64) -> f64 {
        match self.kind {
            EffectKind::Invulnerability => 0.0,
            EffectKind::Stunned => damage * self.magnitude,
            EffectKind::Shielded => {
                let EffectData::Shield { remaining } = &mut self.data else {
                    return damage;
                };
                let absorbed = remaining.min(damage);
                *remaining -= absorbed;
                damage - absorbed
            }
            _ => damage,
        }
    }

    /// Whether this effect vetoes an imminent death. The caller removes the
    /// effect afterwards when [`Self::consumed_on_prevent`] says so.
    pub fn prevents_death(&self) -> bool {
        matches!(self.kind, EffectKind::Blessed)
    }

    pub fn consumed_on_prevent(&self) -> bool {
        matches!(self.kind, EffectKind::Blessed)
    }

    /// Movement notification, used by Excited to track stillness.
    pub fn on_movement(&mut self, intensity: f64, now: u64) {
        if intensity < EXCITED_MOVE_EPSILON {
            return;
        }
        if let EffectData::Excited { last_movement_at } = &mut self.data {
            *last_movement_at = now;
        }
    }

    pub fn tick(&mut self, now: u64, dt: u64) -> EffectTickAction {
        match self.kind {
            EffectKind::Regenerating => EffectTickAction::Heal(self.magnitude * dt as f64 / 1000.0),
            EffectKind::Excited => {
                let EffectData::Excited { last_movement_at } = &self.data else {
                    return EffectTickAction::None;
                };
                if now.saturating_sub(*last_movement_at) >= EXCITED_STILLNESS_MS {
                    EffectTickAction::KillOwner
                } else {
                    EffectTickAction::None
                }
            }
            _ => EffectTickAction::None,
        }
    }

    pub fn should_expire(&self, now: u64) -> bool {
        if let Some(end) = self.end_time {
            if now >= end {
                return true;
            }
        }
        // A drained shield is gone even if its duration has time left.
        matches!(self.data, EffectData::Shield { remaining } if remaining <= 0.0)
    }
}

/// The toughness a player actually divides damage by: an active Toughened wins
/// outright, otherwise the base value scaled by every multiplier effect.
pub fn effective_toughness(base: f64, effects: &[StatusEffect]) -> f64 {
    for effect in effects {
        if effect.kind == EffectKind::Toughened {
            return effect.magnitude;
        }
    }
    let mut toughness = base;
    for effect in effects {
        match effect.kind {
            EffectKind::Strengthened | EffectKind::Weakened => toughness *= effect.magnitude,
            _ => {}
        }
    }
    toughness
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn shield_absorbs_up_to_capacity_then_overflows() {
        let mut shield = StatusEffect::new(EffectKind::Shielded, 0, None, Some(30.0));
        assert_eq!(shield.modify_incoming_damage(10.0), 0.0);
        assert_eq!(shield.modify_incoming_damage(25.0), 5.0);
        // Drained.
        assert!(shield.should_expire(0));
        assert_eq!(shield.modify_incoming_damage(7.0), 7.0);
    }

    #[test]
    fn stunned_multiplies_damage() {
        let mut stunned = StatusEffect::new(EffectKind::Stunned, 0, Some(4000), None);
        assert_eq!(stunned.modify_incoming_damage(3.0), 15.0);
    }

    #[test]
    fn invulnerability_blocks_everything() {
        let mut invuln = StatusEffect::new(EffectKind::Invulnerability, 0, Some(2000), None);
        assert_eq!(invuln.modify_incoming_damage(1e9), 0.0);
    }

    #[test]
    fn expiry_follows_end_time() {
        let effect = StatusEffect::new(EffectKind::Stunned, 1000, Some(500), None);
        assert!(!effect.should_expire(1400));
        assert!(effect.should_expire(1500));
        let indefinite = StatusEffect::new(EffectKind::Invulnerability, 0, None, None);
        assert!(!indefinite.should_expire(u64::MAX / 2));
    }

    #[test]
    fn excited_kills_after_stillness() {
        let mut excited = StatusEffect::new(EffectKind::Excited, 0, None, None);
        assert_eq!(excited.tick(1900, 100), EffectTickAction::None);
        excited.on_movement(0.5, 1900);
        assert_eq!(excited.tick(3800, 100), EffectTickAction::None);
        // Below the movement epsilon nothing resets.
        excited.on_movement(0.01, 3800);
        assert_eq!(excited.tick(3900, 100), EffectTickAction::KillOwner);
    }

    #[test]
    fn regenerating_heals_at_rate() {
        let mut regen = StatusEffect::new(EffectKind::Regenerating, 0, Some(10_000), Some(20.0));
        assert_eq!(regen.tick(100, 100), EffectTickAction::Heal(2.0));
    }

    #[test]
    fn toughened_overrides_multipliers() {
        let effects = vec![
            StatusEffect::new(EffectKind::Strengthened, 0, None, Some(3.0)),
            StatusEffect::new(EffectKind::Toughened, 0, Some(5000), Some(4.0)),
        ];
        assert_eq!(effective_toughness(1.0, &effects), 4.0);
    }

    #[test]
    fn multipliers_stack_on_base() {
        let effects = vec![
            StatusEffect::new(EffectKind::Strengthened, 0, None, Some(2.0)),
            StatusEffect::new(EffectKind::Weakened, 0, None, Some(0.5)),
        ];
        assert_eq!(effective_toughness(2.0, &effects), 2.0);
    }

    #[test]
    fn refresh_refills_shield_and_clock() {
        let mut shield = StatusEffect::new(EffectKind::Shielded, 0, Some(1000), Some(10.0));
        assert_eq!(shield.modify_incoming_damage(10.0), 0.0);
        shield.refresh(500, Some(1000), None);
        assert!(!shield.should_expire(1400));
        assert_eq!(shield.modify_incoming_damage(10.0), 0.0);
    }
}
