//! Engine configuration.
//!
//! Every field has a default, so `{}` is a valid configuration file.

use crate::scheduler::SchedulerConfig;
use crate::selection::SelectionConfig;
use crate::surface::ViewPadding;
use crate::view_composer::ComposerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Configuration for one [`crate::engine::MapEngine`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub composer: ComposerConfig,
    pub selection: SelectionConfig,

    /// Screen padding used when fitting the view
    pub view_padding_px: Option<u32>,

    /// Skip the per-cycle refit in live mode (the user controls the view)
    pub freeze_view: bool,
}

impl EngineConfig {
    pub const DEFAULT_VIEW_PADDING_PX: u32 = 24;

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn view_padding(&self) -> ViewPadding {
        ViewPadding(self.view_padding_px.unwrap_or(Self::DEFAULT_VIEW_PADDING_PX))
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be > 0".into()));
        }

        let c = &self.composer;
        if !c.padding_fraction.is_finite() || c.padding_fraction < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "padding_fraction must be a non-negative number, got {}",
                c.padding_fraction
            )));
        }
        if !c.min_span_deg.is_finite() || c.min_span_deg < 0.0 || c.min_span_deg > 180.0 {
            return Err(ConfigError::Invalid(format!(
                "min_span_deg must be within [0, 180], got {}",
                c.min_span_deg
            )));
        }
        if !c.fallback_half_span_deg.is_finite() || c.fallback_half_span_deg <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "fallback_half_span_deg must be positive, got {}",
                c.fallback_half_span_deg
            )));
        }

        if !(1..=20).contains(&self.selection.focus_zoom) {
            return Err(ConfigError::Invalid(format!(
                "focus_zoom must be within [1, 20], got {}",
                self.selection.focus_zoom
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_json_is_default() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.scheduler.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.view_padding(), ViewPadding(24));
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_json_str(
            r#"{ "scheduler": { "poll_interval_ms": 2500 }, "selection": { "focus_zoom": 10 } }"#,
        )
        .unwrap();
        assert_eq!(config.scheduler.poll_interval_ms, 2500);
        assert_eq!(config.selection.focus_zoom, 10);
        assert_eq!(config.composer, ComposerConfig::default());
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = EngineConfig::from_json_str(r#"{ "scheduler": { "poll_interval_ms": 0 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_negative_padding() {
        let mut config = EngineConfig::default();
        config.composer.padding_fraction = -0.1;
        assert!(config.validate().is_err());

        config.composer.padding_fraction = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error() {
        let err = EngineConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::from_json_file("/nonexistent/skywatch.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
