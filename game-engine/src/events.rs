//! Round-scoped game events: dynamic modifiers that mutate global parameters
//! under probabilistic rules. Events run between the mode tick and the player
//! ticks, so a threshold shift applies to the same tick's damage checks.

use crate::movement::MovementState;
use crate::outbound::OutboundQueue;
use protocol::{ModeEventData, ServerMessage};
use rand::Rng;
use rand::RngCore;

/// Everything an event hook may touch.
pub struct EventCtx<'a> {
    pub now: u64,
    pub mode_name: &'a str,
    pub movement: &'a mut MovementState,
    pub queue: &'a mut OutboundQueue,
    pub rng: &'a mut dyn RngCore,
}

/// The event contract. Implementations are registered per round by the engine.
pub trait GameEventBehavior: Send {
    fn name(&self) -> &'static str;
    fn on_round_start(&mut self, ctx: &mut EventCtx<'_>);
    fn on_tick(&mut self, ctx: &mut EventCtx<'_>);
    fn on_round_end(&mut self, ctx: &mut EventCtx<'_>);
    fn on_player_death(&mut self, _ctx: &mut EventCtx<'_>, _victim_id: &str) {}
}

pub const SPEED_SHIFT_CHECK_INTERVAL_MS: u64 = 5000;
pub const SPEED_SHIFT_TRANSITION_DELAY_MS: u64 = 1000;
pub const SPEED_SHIFT_FAST_MULTIPLIER: f64 = 2.0;

const STAY_BASE_SLOW: f64 = 0.75;
const STAY_BASE_FAST: f64 = 2.0 / 3.0;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ShiftPhase {
    Slow,
    Fast,
}

/// Alternates between a slow phase (difficulty unchanged) and a fast phase
/// (danger threshold multiplied, i.e. players may move more). Every check
/// interval one Bernoulli trial decides whether to stay; the stay probability
/// decays as `base^n` with the number of checks since the last transition, so
/// long stretches without a shift become increasingly unlikely.
pub struct SpeedShift {
    phase: ShiftPhase,
    next_check_at: u64,
    checks_since_transition: u32,
    saved_threshold: f64,
    /// Set while a fast-to-slow restore is waiting out the reaction window.
    restore_at: Option<u64>,
    multiplier: f64,
}

impl SpeedShift {
    pub fn new() -> Self {
        SpeedShift {
            phase: ShiftPhase::Slow,
            next_check_at: SPEED_SHIFT_CHECK_INTERVAL_MS,
            checks_since_transition: 0,
            saved_threshold: 0.0,
            restore_at: None,
            multiplier: SPEED_SHIFT_FAST_MULTIPLIER,
        }
    }

    fn stay_base(&self) -> f64 {
        match self.phase {
            ShiftPhase::Slow => STAY_BASE_SLOW,
            ShiftPhase::Fast => STAY_BASE_FAST,
        }
    }

    fn emit(&self, ctx: &mut EventCtx<'_>, event_type: &str, phase: &str, threshold: f64) {
        ctx.queue.broadcast(ServerMessage::ModeEvent {
            mode_name: ctx.mode_name.to_string(),
            event_type: event_type.to_string(),
            data: ModeEventData { phase: phase.to_string(), danger_threshold: threshold },
        });
    }

    fn enter_fast(&mut self, ctx: &mut EventCtx<'_>) {
        self.saved_threshold = ctx.movement.config().danger_threshold;
        let target = self.saved_threshold * self.multiplier;
        ctx.movement.apply_temporary(|c| c.danger_threshold = target);
        self.phase = ShiftPhase::Fast;
        self.emit(ctx, "speed-shift:start", "fast", target);
    }

    /// The audio cue goes out immediately; the threshold follows after the
    /// reaction window so players can wind down.
    fn leave_fast(&mut self, ctx: &mut EventCtx<'_>) {
        self.phase = ShiftPhase::Slow;
        self.restore_at = Some(ctx.now + SPEED_SHIFT_TRANSITION_DELAY_MS);
        self.emit(ctx, "speed-shift:end", "slow", self.saved_threshold);
    }
}

impl GameEventBehavior for SpeedShift {
    fn name(&self) -> &'static str {
        "speed-shift"
    }

    fn on_round_start(&mut self, ctx: &mut EventCtx<'_>) {
        self.phase = ShiftPhase::Slow;
        self.next_check_at = SPEED_SHIFT_CHECK_INTERVAL_MS;
        self.checks_since_transition = 0;
        self.restore_at = None;
        self.saved_threshold = ctx.movement.config().danger_threshold;
    }

    fn on_tick(&mut self, ctx: &mut EventCtx<'_>) {
        if let Some(at) = self.restore_at {
            if ctx.now >= at {
                ctx.movement.restore();
                self.restore_at = None;
            }
        }
        if ctx.now < self.next_check_at {
            return;
        }
        self.next_check_at += SPEED_SHIFT_CHECK_INTERVAL_MS;
        self.checks_since_transition += 1;
        let stay_probability = self.stay_base().powi(self.checks_since_transition as i32);
        if ctx.rng.gen_range(0.0..1.0) < stay_probability {
            return;
        }
        self.checks_since_transition = 0;
        match self.phase {
            ShiftPhase::Slow => self.enter_fast(ctx),
            ShiftPhase::Fast => self.leave_fast(ctx),
        }
    }

    fn on_round_end(&mut self, ctx: &mut EventCtx<'_>) {
        if self.phase == ShiftPhase::Fast || self.restore_at.is_some() {
            ctx.movement.restore();
        }
        self.phase = ShiftPhase::Slow;
        self.restore_at = None;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::movement::MovementConfig;
    use rand::rngs::mock::StepRng;

    fn movement(threshold: f64) -> MovementState {
        MovementState::new(MovementConfig { danger_threshold: threshold, ..MovementConfig::default() })
    }

    /// A roll near 1.0 always beats the stay probability, forcing a transition.
    fn always_shift() -> StepRng {
        StepRng::new(u64::MAX, 0)
    }

    /// A roll of 0.0 always stays.
    fn never_shift() -> StepRng {
        StepRng::new(0, 0)
    }

    fn ctx<'a>(
        now: u64,
        movement: &'a mut MovementState,
        queue: &'a mut OutboundQueue,
        rng: &'a mut StepRng,
    ) -> EventCtx<'a> {
        EventCtx { now, mode_name: "classic", movement, queue, rng }
    }

    #[test]
    fn fast_phase_multiplies_the_live_threshold() {
        let mut movement = movement(0.1);
        let mut queue = OutboundQueue::default();
        let mut rng = always_shift();
        let mut shift = SpeedShift::new();

        shift.on_round_start(&mut ctx(0, &mut movement, &mut queue, &mut rng));
        shift.on_tick(&mut ctx(4900, &mut movement, &mut queue, &mut rng));
        assert_eq!(movement.config().danger_threshold, 0.1);

        // First check at 5000 transitions immediately under a forced roll.
        shift.on_tick(&mut ctx(5000, &mut movement, &mut queue, &mut rng));
        assert!((movement.config().danger_threshold - 0.2).abs() < 1e-9);
    }

    #[test]
    fn stay_rolls_keep_the_slow_phase() {
        let mut movement = movement(0.1);
        let mut queue = OutboundQueue::default();
        let mut rng = never_shift();
        let mut shift = SpeedShift::new();

        shift.on_round_start(&mut ctx(0, &mut movement, &mut queue, &mut rng));
        for check in 1..=10u64 {
            shift.on_tick(&mut ctx(check * 5000, &mut movement, &mut queue, &mut rng));
        }
        assert_eq!(movement.config().danger_threshold, 0.1);
        assert!(queue.records().is_empty());
    }

    #[test]
    fn restore_waits_out_the_reaction_window() {
        let mut movement = movement(0.1);
        let mut queue = OutboundQueue::default();
        let mut rng = always_shift();
        let mut shift = SpeedShift::new();

        shift.on_round_start(&mut ctx(0, &mut movement, &mut queue, &mut rng));
        shift.on_tick(&mut ctx(5000, &mut movement, &mut queue, &mut rng));
        // Fast to slow at the next check: the announcement is immediate...
        shift.on_tick(&mut ctx(10_000, &mut movement, &mut queue, &mut rng));
        assert_eq!(queue.drain().len(), 2);
        // ...but the threshold holds through the transition delay.
        shift.on_tick(&mut ctx(10_900, &mut movement, &mut queue, &mut rng));
        assert!((movement.config().danger_threshold - 0.2).abs() < 1e-9);
        shift.on_tick(&mut ctx(11_000, &mut movement, &mut queue, &mut rng));
        assert_eq!(movement.config().danger_threshold, 0.1);
    }

    #[test]
    fn round_end_restores_immediately() {
        let mut movement = movement(0.1);
        let mut queue = OutboundQueue::default();
        let mut rng = always_shift();
        let mut shift = SpeedShift::new();

        shift.on_round_start(&mut ctx(0, &mut movement, &mut queue, &mut rng));
        shift.on_tick(&mut ctx(5000, &mut movement, &mut queue, &mut rng));
        assert!((movement.config().danger_threshold - 0.2).abs() < 1e-9);
        shift.on_round_end(&mut ctx(6000, &mut movement, &mut queue, &mut rng));
        assert_eq!(movement.config().danger_threshold, 0.1);
    }

    #[test]
    fn pending_restore_resolves_before_a_new_fast_phase() {
        let mut movement = movement(0.1);
        let mut queue = OutboundQueue::default();
        let mut rng = always_shift();
        let mut shift = SpeedShift::new();

        shift.on_round_start(&mut ctx(0, &mut movement, &mut queue, &mut rng));
        shift.on_tick(&mut ctx(5000, &mut movement, &mut queue, &mut rng));
        shift.on_tick(&mut ctx(10_000, &mut movement, &mut queue, &mut rng));
        // The next check lands after the restore; the new fast phase doubles
        // the restored value, not the stale fast one.
        shift.on_tick(&mut ctx(15_000, &mut movement, &mut queue, &mut rng));
        assert!((movement.config().danger_threshold - 0.2).abs() < 1e-9);
        // No stale restore may fire later.
        shift.on_tick(&mut ctx(16_000, &mut movement, &mut queue, &mut rng));
        assert!((movement.config().danger_threshold - 0.2).abs() < 1e-9);
    }
}
