//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for the execution engine and the insight generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum response runs driven concurrently.
    pub max_concurrent_runs: usize,
    /// Default step timeout when a playbook step does not set one.
    pub default_step_timeout_secs: u64,
    /// Success rate at or below which a run proposes an insight.
    pub low_success_rate: f64,
    /// Success rate at or above which a run proposes an insight
    /// (candidate for raising autonomy).
    pub high_success_rate: f64,
    /// How many repetitions of the same manual action across
    /// incidents warrant an automation insight.
    pub min_repeat_occurrences: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 8,
            default_step_timeout_secs: 60,
            low_success_rate: 0.5,
            high_success_rate: 0.95,
            min_repeat_occurrences: 3,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_runs == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_runs must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.low_success_rate)
            || !(0.0..=1.0).contains(&self.high_success_rate)
        {
            return Err(ConfigError::Invalid(
                "success rate thresholds must be within 0.0..=1.0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrent_runs, 8);
        assert_eq!(config.default_step_timeout_secs, 60);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = EngineConfig::from_toml("max_concurrent_runs = 2\n").unwrap();
        assert_eq!(config.max_concurrent_runs, 2);
        // Unspecified fields fall back to defaults
        assert_eq!(config.min_repeat_occurrences, 3);
    }

    #[test]
    fn test_invalid_rejected() {
        assert!(EngineConfig::from_toml("max_concurrent_runs = 0\n").is_err());
        assert!(EngineConfig::from_toml("low_success_rate = 1.5\n").is_err());
    }
}
