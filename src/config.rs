//! Agent configuration.
//!
//! A single JSON document, read at startup and hot-applied through
//! [`crate::supervisor::ConfigHandle`]. Invalid files are rejected with a
//! structured error and the process continues on defaults.

use std::path::Path;

use garde::Validate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::triggers::TriggerMoment;
use crate::{AppError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case", default)]
#[garde(allow_unvalidated)]
pub struct AgentConfig {
    pub features: FeatureSettings,
    #[garde(dive)]
    pub analytics: AnalyticsSettings,
    #[garde(dive)]
    pub dispatch: DispatchSettings,
    #[garde(dive)]
    pub transport: TransportSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct FeatureSettings {
    pub matchup: FeatureToggle,
    pub my_counters: FeatureToggle,
    pub enemy_counters: FeatureToggle,
    pub build_guide: BuildGuideToggle,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            matchup: FeatureToggle {
                enabled: true,
                trigger: TriggerMoment::Pick,
            },
            my_counters: FeatureToggle {
                enabled: true,
                trigger: TriggerMoment::Hover,
            },
            enemy_counters: FeatureToggle {
                enabled: false,
                trigger: TriggerMoment::Pick,
            },
            build_guide: BuildGuideToggle {
                enabled: true,
                trigger: TriggerMoment::LockIn,
                open_in_game: false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct FeatureToggle {
    pub enabled: bool,
    pub trigger: TriggerMoment,
}

impl Default for FeatureToggle {
    fn default() -> Self {
        Self {
            enabled: false,
            trigger: TriggerMoment::Pick,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct BuildGuideToggle {
    pub enabled: bool,
    pub trigger: TriggerMoment,
    pub open_in_game: bool,
}

impl Default for BuildGuideToggle {
    fn default() -> Self {
        Self {
            enabled: false,
            trigger: TriggerMoment::LockIn,
            open_in_game: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case", default)]
#[garde(allow_unvalidated)]
pub struct AnalyticsSettings {
    #[garde(custom(is_http_url))]
    pub base_url: String,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            base_url: "https://lolanalytics.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case", default)]
#[garde(allow_unvalidated)]
pub struct DispatchSettings {
    /// Wait before opening, so a run of rapid-fire updates settles first.
    #[garde(range(max = 10_000))]
    pub delay_ms: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self { delay_ms: 1_000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case", default)]
#[garde(allow_unvalidated)]
pub struct TransportSettings {
    #[garde(range(min = 100, max = 60_000))]
    pub retry_interval_ms: u64,
    /// 0 means retry forever.
    pub max_retries: u32,
    pub backoff: BackoffKind,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            retry_interval_ms: 2_000,
            max_retries: 0,
            backoff: BackoffKind::Exponential,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Linear,
    #[default]
    Exponential,
}

impl AgentConfig {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("{}: {e}", path.display())))?;
        let config: AgentConfig =
            serde_json::from_str(&raw).map_err(|e| AppError::Config(e.to_string()))?;
        config
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Load, or fall back to defaults on any error. The error is logged so a
    /// broken file is not mistaken for an intentional default setup.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "using default configuration");
                Self::default()
            }
        }
    }
}

fn is_http_url(value: &str, _context: &()) -> garde::Result {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(garde::Error::new("base_url must be an http(s) URL"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "draftwatch-config-{}-{:p}.json",
            std::process::id(),
            contents
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_full_document_round_trips() {
        let json = r#"{
            "features": {
                "matchup": {"enabled": true, "trigger": "pick"},
                "my_counters": {"enabled": true, "trigger": "hover"},
                "enemy_counters": {"enabled": true, "trigger": "pick"},
                "build_guide": {"enabled": true, "trigger": "lock_in", "open_in_game": true}
            },
            "analytics": {"base_url": "https://lolanalytics.com"},
            "dispatch": {"delay_ms": 500},
            "transport": {"retry_interval_ms": 1000, "max_retries": 5, "backoff": "linear"}
        }"#;
        let path = write_temp(json);
        let config = AgentConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(config.features.build_guide.open_in_game);
        assert_eq!(config.features.my_counters.trigger, TriggerMoment::Hover);
        assert_eq!(config.dispatch.delay_ms, 500);
        assert_eq!(config.transport.backoff, BackoffKind::Linear);
    }

    #[test]
    fn test_missing_sections_take_defaults() {
        let path = write_temp(r#"{"dispatch": {"delay_ms": 0}}"#);
        let config = AgentConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.dispatch.delay_ms, 0);
        assert_eq!(config.analytics, AnalyticsSettings::default());
        assert!(config.features.matchup.enabled);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let path = write_temp("{not json");
        assert!(matches!(
            AgentConfig::load(&path),
            Err(AppError::Config(_))
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_out_of_range_delay_rejected() {
        let path = write_temp(r#"{"dispatch": {"delay_ms": 60000}}"#);
        assert!(matches!(
            AgentConfig::load(&path),
            Err(AppError::Config(_))
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_non_http_base_url_rejected() {
        let path = write_temp(r#"{"analytics": {"base_url": "ftp://example.com"}}"#);
        assert!(matches!(
            AgentConfig::load(&path),
            Err(AppError::Config(_))
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_or_default_survives_missing_file() {
        let config = AgentConfig::load_or_default(Path::new("/nonexistent/draftwatch.json"));
        assert_eq!(config, AgentConfig::default());
    }
}
