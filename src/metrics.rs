use std::fmt;
use std::fs;
use std::path::Path;

use candle_core::{DType, Tensor, D};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    SparseCategoricalAccuracy,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::SparseCategoricalAccuracy => "accuracy",
        }
    }

    pub fn state(&self) -> MetricState {
        MetricState {
            metric: *self,
            correct: 0,
            total: 0,
        }
    }
}

/// Running value of a metric over the batches seen since the last reset.
#[derive(Debug, Clone)]
pub struct MetricState {
    metric: Metric,
    correct: u64,
    total: u64,
}

impl MetricState {
    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn update(&mut self, output: &Tensor, targets: &Tensor) -> Result<()> {
        match self.metric {
            Metric::SparseCategoricalAccuracy => {
                let correct = output
                    .argmax(D::Minus1)?
                    .eq(targets)?
                    .to_dtype(DType::U32)?
                    .sum_all()?
                    .to_scalar::<u32>()?;
                self.correct += correct as u64;
                self.total += targets.dims1()? as u64;
            }
        }
        Ok(())
    }

    pub fn result(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f64 / self.total as f64
    }

    pub fn reset(&mut self) {
        self.correct = 0;
        self.total = 0;
    }
}

/// Weighted running mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mean {
    sum: f64,
    weight: f64,
}

impl Mean {
    pub fn update(&mut self, value: f64, weight: usize) {
        self.sum += value * weight as f64;
        self.weight += weight as f64;
    }

    pub fn result(&self) -> f64 {
        if self.weight == 0.0 {
            return 0.0;
        }
        self.sum / self.weight
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
    pub examples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochLogs {
    pub epoch: usize,
    pub epochs: usize,
    pub loss: f64,
    pub accuracy: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub val_loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub val_accuracy: Option<f64>,
    pub seconds: f64,
}

impl fmt::Display for EpochLogs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "epoch {}/{} - {:.1}s - loss: {:.4} - accuracy: {:.4}",
            self.epoch, self.epochs, self.seconds, self.loss, self.accuracy
        )?;
        if let (Some(loss), Some(accuracy)) = (self.val_loss, self.val_accuracy) {
            write!(f, " - val_loss: {loss:.4} - val_accuracy: {accuracy:.4}")?;
        }
        Ok(())
    }
}

/// Per-epoch record returned by `fit`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub epochs: Vec<EpochLogs>,
}

impl History {
    pub fn last(&self) -> Option<&EpochLogs> {
        self.epochs.last()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| Error::io(path, e))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn accuracy_accumulates_across_batches() {
        let mut state = Metric::SparseCategoricalAccuracy.state();

        let output = Tensor::new(&[[0.9f32, 0.1], [0.2, 0.8]], &Device::Cpu).unwrap();
        state.update(&output, &Tensor::new(&[0u32, 0], &Device::Cpu).unwrap()).unwrap();
        assert_eq!(state.result(), 0.5);

        let output = Tensor::new(&[[0.3f32, 0.7], [0.6, 0.4]], &Device::Cpu).unwrap();
        state.update(&output, &Tensor::new(&[1u32, 0], &Device::Cpu).unwrap()).unwrap();
        assert_eq!(state.result(), 0.75);

        state.reset();
        assert_eq!(state.result(), 0.0);
    }

    #[test]
    fn mean_is_weighted() {
        let mut mean = Mean::default();
        mean.update(1.0, 3);
        mean.update(3.0, 1);
        assert_eq!(mean.result(), 1.5);
    }

    #[test]
    fn epoch_line_includes_validation_when_present() {
        let mut logs = EpochLogs {
            epoch: 3,
            epochs: 10,
            loss: 0.31274,
            accuracy: 0.88612,
            val_loss: None,
            val_accuracy: None,
            seconds: 2.0,
        };
        assert_eq!(logs.to_string(), "epoch 3/10 - 2.0s - loss: 0.3127 - accuracy: 0.8861");

        logs.val_loss = Some(0.35);
        logs.val_accuracy = Some(0.87);
        assert!(logs.to_string().ends_with(" - val_loss: 0.3500 - val_accuracy: 0.8700"));
    }

    #[test]
    fn history_round_trips_through_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let history = History {
            epochs: vec![EpochLogs {
                epoch: 1,
                epochs: 1,
                loss: 0.5,
                accuracy: 0.8,
                val_loss: Some(0.6),
                val_accuracy: Some(0.75),
                seconds: 1.0,
            }],
        };
        history.save(&path).unwrap();
        assert_eq!(History::load(&path).unwrap(), history);
    }
}
