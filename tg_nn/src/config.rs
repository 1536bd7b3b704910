//! Training configuration, loadable from YAML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Hyperparameters of one training run.
///
/// Every field has a default, so a YAML file only needs the keys it changes:
///
/// ```yaml
/// layer_sizes: [64, 32, 10]
/// epochs: 5
/// learning_rate: 0.05
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    /// Widths from input to output, e.g. `[64, 32, 10]`.
    pub layer_sizes: Vec<usize>,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// SGD momentum; 0 disables it.
    pub momentum: f64,
    /// Report progress every this many steps.
    pub print_every: usize,
    /// Seed for weight init, shuffling and synthetic data.
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            layer_sizes: vec![64, 32, 10],
            epochs: 10,
            batch_size: 32,
            learning_rate: 0.1,
            momentum: 0.0,
            print_every: 10,
            seed: 42,
        }
    }
}

impl TrainConfig {
    /// Check numeric ranges before anything is built.
    pub fn validate(&self) -> Result<()> {
        if self.layer_sizes.len() < 2 {
            return Err(Error::Config(format!(
                "layer_sizes needs at least 2 entries, got {:?}",
                self.layer_sizes
            )));
        }
        if self.layer_sizes.contains(&0) {
            return Err(Error::Config(format!(
                "layer_sizes must be positive, got {:?}",
                self.layer_sizes
            )));
        }
        if self.epochs == 0 {
            return Err(Error::Config("epochs must be > 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be > 0".to_string()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::Config(format!(
                "learning_rate must be > 0, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(Error::Config(format!(
                "momentum must be in [0, 1), got {}",
                self.momentum
            )));
        }
        if self.print_every == 0 {
            return Err(Error::Config("print_every must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: TrainConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Read and validate a YAML config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<TrainConfig> {
    let path = path.as_ref();
    let yaml = std::fs::read_to_string(path)?;
    let config = TrainConfig::from_yaml_str(&yaml)?;
    tracing::debug!(path = %path.display(), ?config, "loaded training config");
    Ok(config)
}

/// Write a config as YAML.
pub fn save_config(config: &TrainConfig, path: impl AsRef<Path>) -> Result<()> {
    std::fs::write(path, config.to_yaml_string()?)?;
    Ok(())
}
