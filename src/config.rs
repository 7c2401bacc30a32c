//! Run configuration.
//!
//! A single JSON document replaces the pile of ambient boolean flags a quick
//! experiment accumulates: which network to run, whether to start fresh or
//! load a model, whether to train and/or evaluate, and the training
//! hyperparameters for this invocation.

use crate::error::{EngineError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Training hyperparameters, passed per invocation and never stored as
/// hidden global state.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Hyperparameters {
    /// Number of passes over the training set.
    pub epochs: usize,
    /// Mini-batch size for FFNN training (the CNN updates per sample).
    pub mini_batch_size: usize,
    /// Gradient descent step size.
    pub learning_rate: f64,
    /// L2 regularization coefficient (FFNN only; 0 disables).
    #[serde(default)]
    pub l2: f64,
}

/// One run of the `digits` binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Which network to run: "ffnn" or "cnn".
    pub network: String,
    /// Initialize random parameters instead of loading `model_path`.
    pub fresh: bool,
    /// Run training.
    pub train: bool,
    /// Evaluate accuracy on the test split.
    pub evaluate: bool,
    /// Standardize FFNN inputs with fitted mean/std statistics.
    #[serde(default)]
    pub standardize: bool,
    /// Directory holding the MNIST IDX files.
    pub data_dir: String,
    /// Model document to load and/or save.
    pub model_path: String,
    /// RNG seed; 0 reseeds from the clock.
    #[serde(default)]
    pub seed: u64,
    /// Cap on training samples (all when absent).
    #[serde(default)]
    pub train_limit: Option<usize>,
    /// Cap on test samples (all when absent).
    #[serde(default)]
    pub test_limit: Option<usize>,
    /// FFNN layer sizes, input first, used when `fresh` is set.
    #[serde(default = "default_ffnn_sizes")]
    pub ffnn_sizes: Vec<usize>,
    pub hyperparameters: Hyperparameters,
}

fn default_ffnn_sizes() -> Vec<usize> {
    vec![784, 30, 10]
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.network != "ffnn" && self.network != "cnn" {
            return Err(EngineError::Config(format!(
                "network must be 'ffnn' or 'cnn', got '{}'",
                self.network
            )));
        }
        if self.standardize && self.network != "ffnn" {
            return Err(EngineError::Config(
                "standardization applies to the ffnn only".to_string(),
            ));
        }
        if !self.train && !self.evaluate {
            return Err(EngineError::Config(
                "nothing to do: enable train and/or evaluate".to_string(),
            ));
        }

        let hp = &self.hyperparameters;
        if self.train {
            if hp.epochs == 0 {
                return Err(EngineError::Config("epochs must be at least 1".to_string()));
            }
            if hp.mini_batch_size == 0 {
                return Err(EngineError::Config(
                    "mini_batch_size must be at least 1".to_string(),
                ));
            }
            if hp.learning_rate <= 0.0 {
                return Err(EngineError::Config(
                    "learning_rate must be positive".to_string(),
                ));
            }
            if hp.l2 < 0.0 {
                return Err(EngineError::Config("l2 must be non-negative".to_string()));
            }
        }
        Ok(())
    }
}

/// Load and validate a run configuration from a JSON file.
pub fn load_run_config(path: impl AsRef<Path>) -> Result<RunConfig> {
    let contents = fs::read_to_string(path)?;
    let config: RunConfig =
        serde_json::from_str(&contents).map_err(|e| EngineError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> RunConfig {
        RunConfig {
            network: "ffnn".to_string(),
            fresh: true,
            train: true,
            evaluate: true,
            standardize: false,
            data_dir: "./data".to_string(),
            model_path: "./models/ffnn.json".to_string(),
            seed: 1,
            train_limit: None,
            test_limit: None,
            ffnn_sizes: default_ffnn_sizes(),
            hyperparameters: Hyperparameters {
                epochs: 1,
                mini_batch_size: 10,
                learning_rate: 0.03,
                l2: 0.0,
            },
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_unknown_network_rejected() {
        let mut config = base_config();
        config.network = "transformer".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_standardize_cnn_rejected() {
        let mut config = base_config();
        config.network = "cnn".to_string();
        config.standardize = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_noop_run_rejected() {
        let mut config = base_config();
        config.train = false;
        config.evaluate = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_learning_rate_rejected() {
        let mut config = base_config();
        config.hyperparameters.learning_rate = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_eval_only_skips_hyperparameter_checks() {
        let mut config = base_config();
        config.train = false;
        config.hyperparameters.learning_rate = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_run_config_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let json = r#"{
            "network": "cnn",
            "fresh": true,
            "train": true,
            "evaluate": true,
            "data_dir": "./data",
            "model_path": "./models/cnn.json",
            "seed": 42,
            "hyperparameters": {
                "epochs": 1,
                "mini_batch_size": 1,
                "learning_rate": 0.005
            }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = load_run_config(file.path()).unwrap();
        assert_eq!(config.network, "cnn");
        assert_eq!(config.hyperparameters.epochs, 1);
        assert_eq!(config.ffnn_sizes, vec![784, 30, 10]);
    }

    #[test]
    fn test_load_run_config_unknown_field() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let json = r#"{ "network": "ffnn", "mystery": 1 }"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        assert!(matches!(
            load_run_config(file.path()),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_sample_config_parses() {
        let config = load_run_config("config/run.json").unwrap();
        assert!(config.validate().is_ok());
    }
}
