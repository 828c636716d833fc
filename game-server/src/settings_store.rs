//! The persisted settings blob: read once at startup, written best effort on
//! every change. A missing or malformed file falls back to defaults; the old
//! flat movement-only format is upgraded by wrapping it.

use game_engine::GameSettings;
use game_engine::movement::MovementConfig;
use tokio::fs;

pub const DEFAULT_SETTINGS_PATH: &str = "settings.json";

/// Loads the blob, falling back to defaults on any problem.
pub async fn load(path: &str) -> GameSettings {
    match fs::read_to_string(path).await {
        Ok(raw) => match parse(&raw) {
            Ok(settings) => settings,
            Err(message) => {
                tracing::warn!(path, message, "Malformed settings blob, using defaults.");
                GameSettings::default()
            }
        },
        Err(err) => {
            tracing::info!(path, ?err, "No settings blob, using defaults.");
            GameSettings::default()
        }
    }
}

/// Parses the current shape, upgrading the legacy flat movement format
/// (recognized by a top-level `dangerThreshold`).
pub fn parse(raw: &str) -> Result<GameSettings, String> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| format!("Failed to parse JSON: {}", e))?;
    if value.get("dangerThreshold").is_some() {
        let movement: MovementConfig = serde_json::from_value(value)
            .map_err(|e| format!("Failed to parse legacy movement config: {}", e))?;
        return Ok(GameSettings { movement, ..GameSettings::default() });
    }
    serde_json::from_value(value).map_err(|e| format!("Failed to parse settings: {}", e))
}

/// Fire-and-forget write; the in-memory settings stay authoritative.
pub fn spawn_save(path: String, settings: GameSettings) {
    tokio::spawn(async move {
        let json = match serde_json::to_string_pretty(&settings) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(?err, "Failed to serialize settings.");
                return;
            }
        };
        if let Err(err) = fs::write(&path, json).await {
            tracing::warn!(path = path.as_str(), ?err, "Failed to persist settings.");
        }
    });
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn current_shape_round_trips() {
        let settings = GameSettings::default();
        let raw = serde_json::to_string(&settings).unwrap();
        assert_eq!(parse(&raw).unwrap(), settings);
    }

    #[test]
    fn legacy_flat_movement_blob_is_wrapped() {
        let raw = r#"{
            "dangerThreshold": 0.25,
            "damageMultiplier": 30.0,
            "deathThreshold": 80.0,
            "historySize": 4,
            "smoothingEnabled": false,
            "oneshotMode": true
        }"#;
        let settings = parse(raw).unwrap();
        assert_eq!(settings.movement.danger_threshold, 0.25);
        assert_eq!(settings.movement.history_size, 4);
        assert!(settings.movement.oneshot_mode);
        // Everything outside the movement block stays at defaults.
        assert_eq!(settings.round_count, 3);
    }

    #[test]
    fn malformed_blobs_report_an_error() {
        assert!(parse("not json").is_err());
        assert!(parse(r#"{"roundCount": "three"}"#).is_err());
    }

    #[test]
    fn partial_blobs_fill_with_defaults() {
        let settings = parse(r#"{"gameMode": "domination", "teamsEnabled": true}"#).unwrap();
        assert_eq!(settings.game_mode, "domination");
        assert!(settings.teams_enabled);
        assert_eq!(settings.tick_rate_ms, 100);
    }
}
