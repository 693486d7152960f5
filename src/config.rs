use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::activation_functions::Activation;
use crate::data::NUM_CLASSES;
use crate::error::{Error, Result};
use crate::layer::LayerSpec;
use crate::optimizer::{OptimizerConfig, OptimizerKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub data_dir: PathBuf,
    pub epochs: usize,
    pub batch_size: usize,
    /// `None` shuffles over the whole training split.
    pub shuffle_buffer: Option<usize>,
    pub prefetch: usize,
    pub seed: u64,
    /// Units of each hidden ReLU layer.
    pub hidden: Vec<usize>,
    /// Dropout after each hidden layer; `0.0` adds no dropout layer.
    pub dropout: f32,
    pub optimizer: OptimizerConfig,
    /// Hold out this fraction of the training split for validation instead
    /// of validating on the test split.
    pub validation_split: Option<f64>,
    pub log_every: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/fashion-mnist"),
            epochs: 10,
            batch_size: 128,
            shuffle_buffer: None,
            prefetch: 2,
            seed: 42,
            hidden: vec![128],
            dropout: 0.0,
            optimizer: OptimizerConfig::default(),
            validation_split: None,
            log_every: 100,
        }
    }
}

/// Individual fields set on the command line. `None` keeps the value from
/// the config file (or the default).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainOverrides {
    pub data_dir: Option<PathBuf>,
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub shuffle_buffer: Option<usize>,
    pub hidden: Option<Vec<usize>>,
    pub dropout: Option<f32>,
    pub validation_split: Option<f64>,
    pub seed: Option<u64>,
    pub optimizer: Option<OptimizerKind>,
    pub learning_rate: Option<f64>,
}

impl TrainConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: TrainConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| Error::io(path, e))
    }

    /// Applies `overrides` and validates the result. The optimizer kind and
    /// learning rate are merged separately: changing only one of them keeps
    /// the other from the current config.
    pub fn apply_overrides(&mut self, overrides: TrainOverrides) -> Result<()> {
        if let Some(dir) = overrides.data_dir {
            self.data_dir = dir;
        }
        if let Some(epochs) = overrides.epochs {
            self.epochs = epochs;
        }
        if let Some(batch_size) = overrides.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(buffer) = overrides.shuffle_buffer {
            self.shuffle_buffer = Some(buffer);
        }
        if let Some(hidden) = overrides.hidden {
            self.hidden = hidden;
        }
        if let Some(dropout) = overrides.dropout {
            self.dropout = dropout;
        }
        if let Some(ratio) = overrides.validation_split {
            self.validation_split = Some(ratio);
        }
        if let Some(seed) = overrides.seed {
            self.seed = seed;
        }

        let kind = overrides.optimizer.unwrap_or_else(|| self.optimizer.kind());
        let learning_rate = overrides
            .learning_rate
            .unwrap_or_else(|| self.optimizer.learning_rate());
        self.optimizer = kind.with_learning_rate(learning_rate);

        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::Config("epochs must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch size must be at least 1".to_string()));
        }
        if self.shuffle_buffer == Some(0) {
            return Err(Error::Config("shuffle buffer must hold at least 1 example".to_string()));
        }
        if self.hidden.is_empty() {
            return Err(Error::Config("at least one hidden layer is required".to_string()));
        }
        if self.hidden.contains(&0) {
            return Err(Error::Config("hidden layers need at least one unit".to_string()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(Error::Config(format!("dropout must be in [0, 1), got {}", self.dropout)));
        }
        if let Some(ratio) = self.validation_split {
            if !(ratio > 0.0 && ratio < 1.0) {
                return Err(Error::Config(format!("validation split must be in (0, 1), got {ratio}")));
            }
        }
        self.optimizer.validate()
    }

    /// `Flatten`, then one `Dense(relu)` per hidden size (each followed by
    /// dropout when enabled), then a linear `Dense` producing class logits.
    pub fn layers(&self) -> Vec<LayerSpec> {
        let mut layers = vec![LayerSpec::Flatten];
        for &units in &self.hidden {
            layers.push(LayerSpec::dense(units, Activation::Relu));
            if self.dropout > 0.0 {
                layers.push(LayerSpec::Dropout { rate: self.dropout });
            }
        }
        layers.push(LayerSpec::dense(NUM_CLASSES, Activation::Linear));
        layers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_reference_run() {
        let config = TrainConfig::default();
        assert_eq!(config.epochs, 10);
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.optimizer, OptimizerConfig::Adam { learning_rate: 0.001 });
        assert_eq!(
            config.layers(),
            vec![
                LayerSpec::Flatten,
                LayerSpec::dense(128, Activation::Relu),
                LayerSpec::dense(10, Activation::Linear),
            ]
        );
        config.validate().unwrap();
    }

    #[test]
    fn dropout_follows_each_hidden_layer() {
        let config = TrainConfig {
            hidden: vec![256, 128],
            dropout: 0.2,
            ..TrainConfig::default()
        };
        let layers = config.layers();
        assert_eq!(layers.len(), 6);
        assert_eq!(layers[2], LayerSpec::Dropout { rate: 0.2 });
        assert_eq!(layers[4], LayerSpec::Dropout { rate: 0.2 });
    }

    #[test]
    fn validate_rejects_bad_values() {
        let bad = [
            TrainConfig { epochs: 0, ..TrainConfig::default() },
            TrainConfig { batch_size: 0, ..TrainConfig::default() },
            TrainConfig { hidden: vec![], ..TrainConfig::default() },
            TrainConfig { hidden: vec![64, 0], ..TrainConfig::default() },
            TrainConfig { dropout: 1.0, ..TrainConfig::default() },
            TrainConfig { shuffle_buffer: Some(0), ..TrainConfig::default() },
            TrainConfig { validation_split: Some(1.5), ..TrainConfig::default() },
            TrainConfig {
                optimizer: OptimizerConfig::Sgd { learning_rate: -1.0 },
                ..TrainConfig::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(Error::Config(_))), "{config:?}");
        }
    }

    fn sgd_config() -> TrainConfig {
        TrainConfig {
            optimizer: OptimizerConfig::Sgd { learning_rate: 0.05 },
            ..TrainConfig::default()
        }
    }

    #[test]
    fn learning_rate_flag_keeps_the_configured_optimizer() {
        let mut config = sgd_config();
        config
            .apply_overrides(TrainOverrides {
                learning_rate: Some(0.2),
                ..TrainOverrides::default()
            })
            .unwrap();
        assert_eq!(config.optimizer, OptimizerConfig::Sgd { learning_rate: 0.2 });
    }

    #[test]
    fn optimizer_flag_keeps_the_configured_learning_rate() {
        let mut config = sgd_config();
        config
            .apply_overrides(TrainOverrides {
                optimizer: Some(OptimizerKind::Adam),
                ..TrainOverrides::default()
            })
            .unwrap();
        assert_eq!(config.optimizer, OptimizerConfig::Adam { learning_rate: 0.05 });
    }

    #[test]
    fn overrides_replace_only_the_given_fields() {
        let mut config = sgd_config();
        config
            .apply_overrides(TrainOverrides {
                data_dir: Some(PathBuf::from("elsewhere")),
                epochs: Some(2),
                hidden: Some(vec![64, 32]),
                dropout: Some(0.3),
                validation_split: Some(0.1),
                seed: Some(7),
                optimizer: Some(OptimizerKind::Adam),
                learning_rate: Some(0.01),
                ..TrainOverrides::default()
            })
            .unwrap();

        assert_eq!(
            config,
            TrainConfig {
                data_dir: PathBuf::from("elsewhere"),
                epochs: 2,
                hidden: vec![64, 32],
                dropout: 0.3,
                validation_split: Some(0.1),
                seed: 7,
                optimizer: OptimizerConfig::Adam { learning_rate: 0.01 },
                ..TrainConfig::default()
            }
        );
    }

    #[test]
    fn no_overrides_leave_the_config_unchanged() {
        let mut config = sgd_config();
        config.apply_overrides(TrainOverrides::default()).unwrap();
        assert_eq!(config, sgd_config());
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let mut config = TrainConfig::default();
        let result = config.apply_overrides(TrainOverrides {
            batch_size: Some(0),
            ..TrainOverrides::default()
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "epochs": 3, "optimizer": { "kind": "sgd", "learning_rate": 0.05 } }"#).unwrap();

        let config = TrainConfig::load(&path).unwrap();
        assert_eq!(config.epochs, 3);
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.optimizer, OptimizerConfig::Sgd { learning_rate: 0.05 });

        config.save(&path).unwrap();
        assert_eq!(TrainConfig::load(&path).unwrap(), config);
    }
}
