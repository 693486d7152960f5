use candle_core::{Device, Tensor, D};
use candle_nn::{loss, ops};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const EPSILON: f32 = 1e-7;

/// Training objective. Targets are always sparse `u32` class indices; the
/// categorical and squared-error losses one-hot encode them internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Loss {
    SparseCategoricalCrossentropy { from_logits: bool },
    CategoricalCrossentropy { from_logits: bool },
    MeanSquaredError,
}

impl Default for Loss {
    fn default() -> Self {
        Loss::SparseCategoricalCrossentropy { from_logits: true }
    }
}

impl Loss {
    /// Mean loss over the batch, as a scalar tensor.
    pub fn compute(&self, output: &Tensor, targets: &Tensor) -> Result<Tensor> {
        let (batch, classes) = output.dims2()?;
        if targets.dims1()? != batch {
            return Err(Error::Shape(format!(
                "{} targets for a batch of {batch}",
                targets.dims1()?
            )));
        }

        let value = match *self {
            Loss::SparseCategoricalCrossentropy { from_logits: true } => loss::cross_entropy(output, targets)?,
            Loss::SparseCategoricalCrossentropy { from_logits: false } => loss::nll(&clipped_log(output)?, targets)?,
            Loss::CategoricalCrossentropy { from_logits } => {
                let log_probs = if from_logits {
                    ops::log_softmax(output, D::Minus1)?
                } else {
                    clipped_log(output)?
                };
                let one_hot = one_hot(targets, classes)?;
                (one_hot * log_probs)?.sum(D::Minus1)?.mean_all()?.neg()?
            }
            Loss::MeanSquaredError => loss::mse(output, &one_hot(targets, classes)?)?,
        };
        Ok(value)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Loss::SparseCategoricalCrossentropy { .. } => "sparse_categorical_crossentropy",
            Loss::CategoricalCrossentropy { .. } => "categorical_crossentropy",
            Loss::MeanSquaredError => "mean_squared_error",
        }
    }
}

fn clipped_log(probs: &Tensor) -> Result<Tensor> {
    Ok(probs.clamp(EPSILON, 1.0 - EPSILON)?.log()?)
}

fn one_hot(targets: &Tensor, classes: usize) -> Result<Tensor> {
    let targets = targets.to_vec1::<u32>()?;
    let mut data = vec![0f32; targets.len() * classes];
    for (row, &class) in targets.iter().enumerate() {
        let class = class as usize;
        if class >= classes {
            return Err(Error::InvalidLabel {
                label: class.min(u8::MAX as usize) as u8,
                classes,
            });
        }
        data[row * classes + class] = 1.0;
    }
    Ok(Tensor::from_vec(data, (targets.len(), classes), &Device::Cpu)?)
}
