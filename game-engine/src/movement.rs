//! Movement configuration and intensity computation. The config is the one piece of
//! global mutable state in the engine: sensitivity presets overwrite it between games
//! and game events may shift it mid round, so every damage check reads it live.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Largest Euclidean magnitude a sample can reach: each axis caps at 10,
/// so the limit is sqrt(300).
pub const MAX_SAMPLE_MAGNITUDE: f64 = 17.320_508_075_688_772;

/// One accelerometer sample as sent by a phone.
#[derive(Clone, Copy, Debug)]
pub struct AccelSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: u64,
}

impl AccelSample {
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Non-finite samples are dropped before they reach any player state.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// The global movement tuning, live-read by every damage check.
#[derive(Clone, PartialEq, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase", default)]
pub struct MovementConfig {
    /// Intensity above this causes damage.
    pub danger_threshold: f64,
    /// Damage per unit of intensity above the threshold.
    pub damage_multiplier: f64,
    /// Accumulated damage at which a player dies.
    pub death_threshold: f64,
    /// Sliding window length for smoothing.
    pub history_size: usize,
    pub smoothing_enabled: bool,
    /// In oneshot mode any offending movement is instantly lethal.
    pub oneshot_mode: bool,
}

impl Default for MovementConfig {
    fn default() -> Self {
        MovementConfig {
            danger_threshold: 0.12,
            damage_multiplier: 50.0,
            death_threshold: 100.0,
            history_size: 5,
            smoothing_enabled: true,
            oneshot_mode: false,
        }
    }
}

/// The engine-owned movement state: the live config plus the saved copy that backs
/// the temporary-apply/restore pairing used by game events.
#[derive(Default, Debug)]
pub struct MovementState {
    config: MovementConfig,
    saved: Option<MovementConfig>,
}

impl MovementState {
    pub fn new(config: MovementConfig) -> Self {
        MovementState { config, saved: None }
    }

    pub fn config(&self) -> &MovementConfig {
        &self.config
    }

    /// Permanent change (settings, sensitivity preset). Drops any saved copy.
    pub fn set_config(&mut self, config: MovementConfig) {
        self.saved = None;
        self.config = config;
    }

    /// Applies a temporary mutation, saving the previous config the first time.
    /// Nested applies keep the oldest save so one restore undoes everything.
    pub fn apply_temporary(&mut self, mutate: impl FnOnce(&mut MovementConfig)) {
        if self.saved.is_none() {
            self.saved = Some(self.config.clone());
        }
        mutate(&mut self.config);
    }

    /// Restores the config saved by [`Self::apply_temporary`]. No-op without one.
    pub fn restore(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.config = saved;
        }
    }

    pub fn has_temporary(&self) -> bool {
        self.saved.is_some()
    }
}

/// Sliding window of recent sample magnitudes.
#[derive(Default, Debug, Clone)]
pub struct MovementWindow {
    magnitudes: VecDeque<f64>,
}

impl MovementWindow {
    /// Pushes a magnitude, evicting the oldest entry beyond `history_size`.
    pub fn push(&mut self, magnitude: f64, history_size: usize) {
        self.magnitudes.push_back(magnitude);
        while self.magnitudes.len() > history_size.max(1) {
            self.magnitudes.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.magnitudes.clear();
    }

    /// Normalized intensity in [0,1]. Smoothed mode averages the window,
    /// otherwise only the newest magnitude counts.
    pub fn intensity(&self, smoothing: bool) -> f64 {
        let magnitude = if smoothing {
            if self.magnitudes.is_empty() {
                return 0.0;
            }
            self.magnitudes.iter().sum::<f64>() / self.magnitudes.len() as f64
        } else {
            match self.magnitudes.back() {
                Some(m) => *m,
                None => return 0.0,
            }
        };
        (magnitude / MAX_SAMPLE_MAGNITUDE).min(1.0)
    }
}
