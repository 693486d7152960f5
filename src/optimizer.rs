use candle_core::{Tensor, Var};
use candle_nn::{AdamW, Optimizer as _, ParamsAdamW, SGD};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OptimizerConfig {
    Adam { learning_rate: f64 },
    Sgd { learning_rate: f64 },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Adam {
            learning_rate: 0.001,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Adam,
    Sgd,
}

impl OptimizerKind {
    pub fn with_learning_rate(self, learning_rate: f64) -> OptimizerConfig {
        match self {
            OptimizerKind::Adam => OptimizerConfig::Adam { learning_rate },
            OptimizerKind::Sgd => OptimizerConfig::Sgd { learning_rate },
        }
    }
}

impl OptimizerConfig {
    pub fn kind(&self) -> OptimizerKind {
        match self {
            OptimizerConfig::Adam { .. } => OptimizerKind::Adam,
            OptimizerConfig::Sgd { .. } => OptimizerKind::Sgd,
        }
    }

    pub fn learning_rate(&self) -> f64 {
        match *self {
            OptimizerConfig::Adam { learning_rate } | OptimizerConfig::Sgd { learning_rate } => learning_rate,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let lr = self.learning_rate();
        if !(lr.is_finite() && lr > 0.0) {
            return Err(Error::Config(format!("learning rate must be positive, got {lr}")));
        }
        Ok(())
    }

    pub fn build(&self, vars: Vec<Var>) -> Result<Optimizer> {
        self.validate()?;
        let optimizer = match *self {
            // Plain Adam is AdamW with no weight decay.
            OptimizerConfig::Adam { learning_rate } => Optimizer::Adam(AdamW::new(
                vars,
                ParamsAdamW {
                    lr: learning_rate,
                    beta1: 0.9,
                    beta2: 0.999,
                    eps: 1e-7,
                    weight_decay: 0.0,
                },
            )?),
            OptimizerConfig::Sgd { learning_rate } => Optimizer::Sgd(SGD::new(vars, learning_rate)?),
        };
        Ok(optimizer)
    }
}

pub enum Optimizer {
    Adam(AdamW),
    Sgd(SGD),
}

impl Optimizer {
    /// Backpropagates `loss` and applies one update to every variable.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        match self {
            Optimizer::Adam(opt) => opt.backward_step(loss)?,
            Optimizer::Sgd(opt) => opt.backward_step(loss)?,
        }
        Ok(())
    }

    pub fn learning_rate(&self) -> f64 {
        match self {
            Optimizer::Adam(opt) => opt.learning_rate(),
            Optimizer::Sgd(opt) => opt.learning_rate(),
        }
    }
}
