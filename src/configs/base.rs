use serde::{Deserialize, Serialize};

use crate::configs::*;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub prefetch: PrefetchConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    pub logging: Option<LoggingConfig>,
}

use crate::common::types::AnyResult;

impl Config {
    pub fn load() -> AnyResult<Self> {
        let config_path = if std::path::Path::new("config.toml").exists() {
            "config.toml"
        } else if std::path::Path::new("config.default.toml").exists() {
            "config.default.toml"
        } else {
            return Err("config.toml or config.default.toml not found".into());
        };

        crate::log_println!("Loading configuration from: {}", config_path);

        let config_str = std::fs::read_to_string(config_path)?;
        if config_str.trim().is_empty() {
            return Err(format!("{} is empty", config_path).into());
        }

        Self::from_toml_str(&config_str)
    }

    pub fn from_toml_str(config_str: &str) -> AnyResult<Self> {
        let mut config: Config = toml::from_str(config_str)?;
        config.normalize();
        Ok(config)
    }

    /// Clamps values that would break the session invariants.
    pub fn normalize(&mut self) {
        self.player.default_volume = self.player.default_volume.min(100);
        self.player.history_size = self.player.history_size.max(1);
        self.player.duplicate_window = self.player.duplicate_window.min(self.player.history_size);
        self.player.event_capacity = self.player.event_capacity.max(16);
        self.prefetch.depth = self.prefetch.depth.clamp(1, 5);
        self.recovery.max_recommendation_attempts = self.recovery.max_recommendation_attempts.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_toml_str("").expect("empty toml is valid");
        assert_eq!(config.player.default_volume, 80);
        assert_eq!(config.player.history_size, 50);
        assert_eq!(config.player.duplicate_window, 20);
        assert_eq!(config.prefetch.lead_ms, 30_000);
        assert_eq!(config.recovery.systemic_threshold, 8);
        assert_eq!(config.recovery.track_threshold, 5);
        assert!(config.sources.http);
        assert!(config.logging.is_none());
    }

    #[test]
    fn test_partial_sections_and_clamping() {
        let config = Config::from_toml_str(
            r#"
            [player]
            default_volume = 250
            auto_continuation = false

            [prefetch]
            depth = 12
            lead_ms = 15000

            [recovery]
            backoff_cap_ms = 5000

            [logging]
            level = "debug"

            [logging.file]
            path = "./logs/rustaqueue.log"
            max_lines = 5000
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.player.default_volume, 100);
        assert!(!config.player.auto_continuation);
        assert_eq!(config.player.play_grace_ms, 300);
        assert_eq!(config.prefetch.depth, 5);
        assert_eq!(config.prefetch.lead_ms, 15_000);
        assert_eq!(config.recovery.backoff_cap_ms, 5_000);
        assert_eq!(config.recovery.backoff_step_ms, 1_000);

        let file = config
            .logging
            .and_then(|l| l.file)
            .expect("file logging configured");
        assert_eq!(file.max_lines, 5000);
    }

    #[test]
    fn test_invalid_type_is_rejected() {
        assert!(Config::from_toml_str("[player]\ndefault_volume = \"loud\"").is_err());
    }
}
