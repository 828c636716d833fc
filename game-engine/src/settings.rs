//! The adjustable game settings, including the clamping rules of the admin surface
//! and the static sensitivity preset table.

use crate::movement::MovementConfig;
use protocol::SettingsUpdate;
use serde::{Deserialize, Serialize};

/// Everything the admin surface can adjust, plus the engine's runtime knobs.
/// The whole struct is the persisted settings blob; unknown or missing fields
/// fall back to defaults on load.
#[derive(Clone, PartialEq, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase", default)]
pub struct GameSettings {
    pub movement: MovementConfig,
    /// Key into the sensitivity preset table.
    pub sensitivity: String,
    pub game_mode: String,
    pub theme: String,
    /// Rounds per game, 1..=10.
    pub round_count: u32,
    /// Seconds, 30..=300. Only modes with timed rounds read it.
    pub round_duration: u32,
    pub teams_enabled: bool,
    /// 2..=4.
    pub team_count: u32,
    /// 5..=100.
    pub domination_point_target: u32,
    /// Seconds, 3..=15.
    pub domination_control_interval: u32,
    /// Seconds, 5..=30.
    pub domination_respawn_time: u32,
    /// 1..=3.
    pub domination_base_count: u32,
    pub tick_rate_ms: u64,
    pub countdown_seconds: u32,
    pub go_delay_ms: u64,
    pub ready_delay_ms: u64,
    /// Lobby disconnects are forgotten after this long.
    pub lobby_grace_ms: u64,
    /// In-game disconnects stop counting as alive after this long.
    pub disconnect_grace_ms: u64,
}

impl Default for GameSettings {
    fn default() -> Self {
        GameSettings {
            movement: MovementConfig::default(),
            sensitivity: "medium".into(),
            game_mode: "classic".into(),
            theme: "classic".into(),
            round_count: 3,
            round_duration: 90,
            teams_enabled: false,
            team_count: 2,
            domination_point_target: 20,
            domination_control_interval: 5,
            domination_respawn_time: 10,
            domination_base_count: 1,
            tick_rate_ms: 100,
            countdown_seconds: 3,
            go_delay_ms: 800,
            ready_delay_ms: 1500,
            lobby_grace_ms: 10_000,
            disconnect_grace_ms: 10_000,
        }
    }
}

/// The static sensitivity presets. Applying one overwrites the movement
/// thresholds; everything else in the movement config stays.
pub const SENSITIVITY_PRESETS: &[(&str, f64, f64)] = &[
    // (key, danger threshold, damage multiplier)
    ("low", 0.20, 40.0),
    ("medium", 0.12, 50.0),
    ("high", 0.08, 60.0),
];

impl GameSettings {
    /// Merges an admin settings update. Out-of-range numerics are clamped,
    /// unknown preset or mode keys are ignored with a warning.
    pub fn apply_update(&mut self, update: &SettingsUpdate) {
        if let Some(key) = &update.sensitivity {
            if self.apply_sensitivity_preset(key) {
                self.sensitivity = key.clone();
            } else {
                tracing::warn!(preset = key.as_str(), "Ignoring unknown sensitivity preset.");
            }
        }
        if let Some(mode) = &update.game_mode {
            self.game_mode = mode.clone();
        }
        if let Some(theme) = &update.theme {
            self.theme = theme.clone();
        }
        if let Some(v) = update.round_count {
            self.round_count = v.clamp(1, 10);
        }
        if let Some(v) = update.round_duration {
            self.round_duration = v.clamp(30, 300);
        }
        if let Some(v) = update.teams_enabled {
            self.teams_enabled = v;
        }
        if let Some(v) = update.team_count {
            self.team_count = v.clamp(2, 4);
        }
        if let Some(v) = update.domination_point_target {
            self.domination_point_target = v.clamp(5, 100);
        }
        if let Some(v) = update.domination_control_interval {
            self.domination_control_interval = v.clamp(3, 15);
        }
        if let Some(v) = update.domination_respawn_time {
            self.domination_respawn_time = v.clamp(5, 30);
        }
        if let Some(v) = update.domination_base_count {
            self.domination_base_count = v.clamp(1, 3);
        }
    }

    /// Returns false for unknown keys.
    pub fn apply_sensitivity_preset(&mut self, key: &str) -> bool {
        for (name, threshold, multiplier) in SENSITIVITY_PRESETS {
            if *name == key {
                self.movement.danger_threshold = *threshold;
                self.movement.damage_multiplier = *multiplier;
                return true;
            }
        }
        false
    }

    pub fn round_duration_ms(&self) -> u64 {
        u64::from(self.round_duration) * 1000
    }

    pub fn domination_control_interval_ms(&self) -> u64 {
        u64::from(self.domination_control_interval) * 1000
    }

    pub fn domination_respawn_ms(&self) -> u64 {
        u64::from(self.domination_respawn_time) * 1000
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn out_of_range_values_are_clamped() {
        let mut settings = GameSettings::default();
        settings.apply_update(&SettingsUpdate {
            round_count: Some(99),
            round_duration: Some(10),
            team_count: Some(7),
            domination_point_target: Some(1),
            domination_control_interval: Some(60),
            domination_respawn_time: Some(2),
            domination_base_count: Some(5),
            ..SettingsUpdate::default()
        });
        assert_eq!(settings.round_count, 10);
        assert_eq!(settings.round_duration, 30);
        assert_eq!(settings.team_count, 4);
        assert_eq!(settings.domination_point_target, 5);
        assert_eq!(settings.domination_control_interval, 15);
        assert_eq!(settings.domination_respawn_time, 5);
        assert_eq!(settings.domination_base_count, 3);
    }

    #[test]
    fn sensitivity_preset_overwrites_thresholds() {
        let mut settings = GameSettings::default();
        settings.apply_update(&SettingsUpdate {
            sensitivity: Some("high".into()),
            ..SettingsUpdate::default()
        });
        assert_eq!(settings.sensitivity, "high");
        assert_eq!(settings.movement.danger_threshold, 0.08);
        assert_eq!(settings.movement.damage_multiplier, 60.0);

        // Unknown keys leave everything untouched.
        settings.apply_update(&SettingsUpdate {
            sensitivity: Some("ultra".into()),
            ..SettingsUpdate::default()
        });
        assert_eq!(settings.sensitivity, "high");
    }

    #[test]
    fn settings_blob_round_trips_and_tolerates_missing_fields() {
        let settings = GameSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: GameSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings, back);

        let partial: GameSettings =
            serde_json::from_str(r#"{"roundCount": 5, "teamsEnabled": true}"#).unwrap();
        assert_eq!(partial.round_count, 5);
        assert!(partial.teams_enabled);
        assert_eq!(partial.tick_rate_ms, 100);
    }
}
