//! CLI configuration

use std::path::PathBuf;
use std::sync::Arc;

use maple_monitor_engine::{EngineConfig, IsolationForest, PatternEngine};
use serde::{Deserialize, Serialize};

use crate::error::{CliError, CliResult};

/// Isolation-forest settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Score with the isolation forest once enough history exists
    pub enabled: bool,
    pub trees: usize,
    pub contamination: f64,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trees: 100,
            contamination: 0.1,
            seed: 42,
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MonitorConfig {
    pub engine: EngineConfig,
    pub model: ModelConfig,
}

impl MonitorConfig {
    /// Load configuration from file, falling back to defaults when it is missing
    pub fn load(path: Option<&str>) -> CliResult<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()?,
        };

        let config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            toml::from_str(&contents)?
        } else {
            MonitorConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CliResult<()> {
        self.engine.validate()?;
        if self.model.enabled {
            if self.model.trees == 0 {
                return Err(CliError::Config("model.trees must be at least 1".into()));
            }
            if !(self.model.contamination > 0.0 && self.model.contamination < 0.5) {
                return Err(CliError::Config(format!(
                    "model.contamination must be in (0, 0.5), got {}",
                    self.model.contamination
                )));
            }
        }
        Ok(())
    }

    /// Build an engine from this configuration.
    pub fn build_engine(&self) -> CliResult<PatternEngine> {
        let engine = if self.model.enabled {
            let forest = IsolationForest::default()
                .with_trees(self.model.trees)
                .with_contamination(self.model.contamination)
                .with_seed(self.model.seed);
            PatternEngine::with_model(self.engine.clone(), Arc::new(forest))?
        } else {
            PatternEngine::new(self.engine.clone())?
        };
        Ok(engine)
    }

    pub fn to_toml(&self) -> CliResult<String> {
        toml::to_string_pretty(self).map_err(|e| CliError::Config(e.to_string()))
    }

    /// Get the default configuration file path
    fn default_config_path() -> CliResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CliError::Config("Cannot find config directory".into()))?;
        Ok(config_dir.join("maple-monitor").join("config.toml"))
    }
}
