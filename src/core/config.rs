//! Engine configuration, loadable from TOML. Every field has a default, so an
//! empty file is a valid configuration.

use std::path::Path;

use serde::Deserialize;

use super::error::ConfigError;
use super::executor::DEFAULT_BATCH_SIZE;
use super::risk::RiskThresholds;
use super::types::DEFAULT_SWEEP_STEPS;
use super::validation::MIN_SIMULATION_COUNT;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SensitivityConfig {
    /// Runs per swept sample; lower than a full simulation for speed.
    pub simulation_count: u32,
    pub steps: u32,
}

impl Default for SensitivityConfig {
    fn default() -> Self {
        Self {
            simulation_count: 500,
            steps: DEFAULT_SWEEP_STEPS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker pool size; 0 means one thread per available core.
    pub worker_threads: usize,
    /// Runs per batch; cancellation and progress are checked between batches.
    pub batch_size: usize,
    pub sensitivity: SensitivityConfig,
    pub risk_thresholds: RiskThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            sensitivity: SensitivityConfig::default(),
            risk_thresholds: RiskThresholds::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".to_string()));
        }
        if self.sensitivity.simulation_count < MIN_SIMULATION_COUNT {
            return Err(ConfigError::Invalid(format!(
                "sensitivity.simulation_count must be >= {MIN_SIMULATION_COUNT}"
            )));
        }
        if self.sensitivity.steps == 0 {
            return Err(ConfigError::Invalid(
                "sensitivity.steps must be > 0".to_string(),
            ));
        }
        self.risk_thresholds
            .validate()
            .map_err(|msg| ConfigError::Invalid(format!("risk_thresholds: {msg}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = EngineConfig::from_toml_str("").expect("empty config is valid");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.sensitivity.steps, 5);
        assert_eq!(config.risk_thresholds.shortfall.low_below, 10.0);
    }

    #[test]
    fn overrides_nested_threshold_table() {
        let raw = r#"
            worker_threads = 2
            batch_size = 128

            [sensitivity]
            simulation_count = 250

            [risk_thresholds]
            version = 3

            [risk_thresholds.shortfall]
            low_below = 5.0
            high_above = 20.0
        "#;
        let config = EngineConfig::from_toml_str(raw).expect("valid config");
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.sensitivity.simulation_count, 250);
        assert_eq!(config.sensitivity.steps, 5);
        assert_eq!(config.risk_thresholds.version, 3);
        assert_eq!(config.risk_thresholds.shortfall.high_above, 20.0);
        assert_eq!(config.risk_thresholds.longevity.extension_years, 5);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = EngineConfig::from_toml_str("batch_size = 0").expect_err("zero batch");
        assert!(err.to_string().contains("batch_size"));

        let err = EngineConfig::from_toml_str("[sensitivity]\nsimulation_count = 10")
            .expect_err("too few runs");
        assert!(err.to_string().contains("simulation_count"));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = EngineConfig::from_toml_str("batch_size = \"many\"").expect_err("bad type");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
