//! The base registry for Domination: 1 to 3 physical base phones, each with an
//! owner team, a control timer and a connected flag. Control progress is derived
//! from timestamps; there are no background timers to cancel.

use crate::error::Rejection;
use protocol::BaseStatusEntry;

/// One registered base endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct BaseState {
    pub base_id: String,
    /// 1-based display number.
    pub base_number: u32,
    /// None means neutral.
    pub owner_team_id: Option<u32>,
    pub last_ownership_change_at: u64,
    /// Full control intervals already paid out for the current ownership.
    pub points_awarded: u32,
    pub is_connected: bool,
}

impl BaseState {
    /// Progress towards the next control point, clamped to [0,1]. Zero while
    /// neutral or disconnected.
    pub fn control_progress(&self, now: u64, interval_ms: u64) -> f64 {
        if self.owner_team_id.is_none() || !self.is_connected || interval_ms == 0 {
            return 0.0;
        }
        let held = now.saturating_sub(self.last_ownership_change_at) as f64;
        (held / interval_ms as f64).min(1.0)
    }
}

/// Owns every registered base for the current game.
#[derive(Default, Debug)]
pub struct BaseRegistry {
    bases: Vec<BaseState>,
    next_number: u32,
}

impl BaseRegistry {
    /// Registers a base phone. A known id reconnects to its base; the control
    /// timer restarts so disconnected intervals never pay out.
    pub fn register(
        &mut self,
        requested_id: Option<String>,
        max_bases: usize,
        now: u64,
    ) -> Result<&BaseState, Rejection> {
        if let Some(id) = &requested_id {
            if let Some(at) = self.bases.iter().position(|b| b.base_id == *id) {
                let base = &mut self.bases[at];
                base.is_connected = true;
                base.last_ownership_change_at = now;
                base.points_awarded = 0;
                return Ok(&self.bases[at]);
            }
        }
        if self.bases.len() >= max_bases {
            return Err(Rejection::BasesFull);
        }
        self.next_number += 1;
        let base_id = requested_id.unwrap_or_else(|| format!("base-{}", self.next_number));
        self.bases.push(BaseState {
            base_id,
            base_number: self.next_number,
            owner_team_id: None,
            last_ownership_change_at: now,
            points_awarded: 0,
            is_connected: true,
        });
        Ok(self.bases.last().expect("just pushed"))
    }

    pub fn mark_disconnected(&mut self, base_id: &str) -> bool {
        match self.bases.iter_mut().find(|b| b.base_id == base_id) {
            Some(base) => {
                base.is_connected = false;
                true
            }
            None => false,
        }
    }

    /// A tap cycles ownership to the next team: neutral goes to the first team,
    /// and from the last team the cycle wraps to the first, never back to
    /// neutral. Resets the control timer.
    pub fn cycle_owner(
        &mut self,
        base_id: &str,
        team_ids: &[u32],
        now: u64,
    ) -> Result<&BaseState, Rejection> {
        if team_ids.is_empty() {
            return Err(Rejection::WrongPhase);
        }
        let at = self
            .bases
            .iter()
            .position(|b| b.base_id == base_id)
            .ok_or(Rejection::UnknownBase)?;
        let base = &mut self.bases[at];
        let next = match base.owner_team_id {
            None => team_ids[0],
            Some(current) => {
                let idx = team_ids.iter().position(|t| *t == current).unwrap_or(0);
                team_ids[(idx + 1) % team_ids.len()]
            }
        };
        base.owner_team_id = Some(next);
        base.last_ownership_change_at = now;
        base.points_awarded = 0;
        Ok(&self.bases[at])
    }

    pub fn get(&self, base_id: &str) -> Option<&BaseState> {
        self.bases.iter().find(|b| b.base_id == base_id)
    }

    pub fn bases(&self) -> &[BaseState] {
        &self.bases
    }

    pub fn bases_mut(&mut self) -> &mut [BaseState] {
        &mut self.bases
    }

    pub fn clear(&mut self) {
        self.bases.clear();
        self.next_number = 0;
    }

    /// Restarts every control timer. Used at round start.
    pub fn reset_control_timers(&mut self, now: u64) {
        for base in &mut self.bases {
            base.owner_team_id = None;
            base.last_ownership_change_at = now;
            base.points_awarded = 0;
        }
    }

    pub fn status_entries(&self, now: u64, interval_ms: u64) -> Vec<BaseStatusEntry> {
        self.bases
            .iter()
            .map(|b| BaseStatusEntry {
                base_id: b.base_id.clone(),
                base_number: b.base_number,
                owner_team_id: b.owner_team_id,
                control_progress: b.control_progress(now, interval_ms),
                is_connected: b.is_connected,
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registration_allocates_numbers_and_caps() {
        let mut bases = BaseRegistry::default();
        let first = bases.register(None, 2, 0).unwrap();
        assert_eq!(first.base_number, 1);
        assert_eq!(first.base_id, "base-1");
        bases.register(Some("door".into()), 2, 0).unwrap();
        assert_eq!(bases.register(None, 2, 0), Err(Rejection::BasesFull));
        // Reconnecting a known base never counts against the cap.
        assert!(bases.register(Some("door".into()), 2, 100).is_ok());
    }

    #[test]
    fn tap_cycle_never_returns_to_neutral() {
        let mut bases = BaseRegistry::default();
        bases.register(Some("b".into()), 1, 0).unwrap();
        let teams = [0u32, 1, 2];
        assert_eq!(bases.cycle_owner("b", &teams, 10).unwrap().owner_team_id, Some(0));
        assert_eq!(bases.cycle_owner("b", &teams, 20).unwrap().owner_team_id, Some(1));
        assert_eq!(bases.cycle_owner("b", &teams, 30).unwrap().owner_team_id, Some(2));
        assert_eq!(bases.cycle_owner("b", &teams, 40).unwrap().owner_team_id, Some(0));
        assert_eq!(bases.cycle_owner("missing", &teams, 50), Err(Rejection::UnknownBase));
    }

    #[test]
    fn control_progress_derives_from_the_timer() {
        let mut bases = BaseRegistry::default();
        bases.register(Some("b".into()), 1, 0).unwrap();
        bases.cycle_owner("b", &[0, 1], 1000).unwrap();
        let base = bases.get("b").unwrap();
        assert_eq!(base.control_progress(1000, 5000), 0.0);
        assert!((base.control_progress(3500, 5000) - 0.5).abs() < 1e-9);
        assert_eq!(base.control_progress(99_000, 5000), 1.0);
    }

    #[test]
    fn disconnect_freezes_progress_and_reconnect_restarts() {
        let mut bases = BaseRegistry::default();
        bases.register(Some("b".into()), 1, 0).unwrap();
        bases.cycle_owner("b", &[0, 1], 0).unwrap();
        bases.mark_disconnected("b");
        assert_eq!(bases.get("b").unwrap().control_progress(4000, 5000), 0.0);
        let base = bases.register(Some("b".into()), 1, 6000).unwrap();
        // Ownership survives, the timer does not.
        assert_eq!(base.owner_team_id, Some(0));
        assert_eq!(base.last_ownership_change_at, 6000);
    }
}
