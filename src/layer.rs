use std::fmt;

use candle_core::{Device, Tensor, Var};
use candle_nn::{Linear, Module};
use rand::distributions::{Distribution, Uniform};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::activation_functions::Activation;
use crate::error::{Error, Result};

/// Description of a layer, before its weights exist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayerSpec {
    Flatten,
    Dense {
        units: usize,
        #[serde(default)]
        activation: Activation,
    },
    Dropout {
        rate: f32,
    },
}

impl LayerSpec {
    pub fn dense(units: usize, activation: Activation) -> Self {
        LayerSpec::Dense { units, activation }
    }
}

/// Fully connected layer: `activation(x W^T + b)`.
pub struct Dense {
    linear: Linear,
    weight: Var,
    bias: Var,
    activation: Activation,
}

impl Dense {
    /// Weights are Glorot-uniform from a `Pcg64` seeded with `seed`; the
    /// bias starts at zero.
    pub fn new(in_dim: usize, units: usize, activation: Activation, seed: u64) -> Result<Self> {
        let mut rng = Pcg64::seed_from_u64(seed);
        let limit = (6.0 / (in_dim + units) as f32).sqrt();
        let uniform = Uniform::new_inclusive(-limit, limit);
        let data: Vec<f32> = (0..units * in_dim)
            .map(|_| uniform.sample(&mut rng))
            .collect();

        let weight = Var::from_tensor(&Tensor::from_vec(data, (units, in_dim), &Device::Cpu)?)?;
        let bias = Var::zeros(units, candle_core::DType::F32, &Device::Cpu)?;
        let linear = Linear::new(weight.as_tensor().clone(), Some(bias.as_tensor().clone()));

        Ok(Self {
            linear,
            weight,
            bias,
            activation,
        })
    }

    pub fn in_dim(&self) -> usize {
        self.weight.dims()[1]
    }

    pub fn units(&self) -> usize {
        self.weight.dims()[0]
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn weight(&self) -> &Var {
        &self.weight
    }

    pub fn bias(&self) -> &Var {
        &self.bias
    }

    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let ys = self.linear.forward(xs)?;
        self.activation.apply(&ys)
    }
}

pub struct Dropout {
    rate: f32,
    inner: candle_nn::Dropout,
}

impl Dropout {
    pub fn new(rate: f32) -> Result<Self> {
        if !(0.0..1.0).contains(&rate) {
            return Err(Error::Config(format!("dropout rate must be in [0, 1), got {rate}")));
        }
        Ok(Self {
            rate,
            inner: candle_nn::Dropout::new(rate),
        })
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }
}

pub enum Layer {
    Flatten,
    Dense(Dense),
    Dropout(Dropout),
}

impl Layer {
    /// Builds the layer for inputs of `input_shape` (batch dimension
    /// excluded) and returns it with its output shape.
    pub fn build(spec: &LayerSpec, input_shape: &[usize], seed: u64) -> Result<(Layer, Vec<usize>)> {
        match *spec {
            LayerSpec::Flatten => Ok((Layer::Flatten, vec![input_shape.iter().product()])),
            LayerSpec::Dense { units, activation } => {
                if units == 0 {
                    return Err(Error::Config("dense layer needs at least one unit".to_string()));
                }
                let in_dim = match input_shape {
                    [n] => *n,
                    other => {
                        return Err(Error::Shape(format!(
                            "dense layer expects flat inputs, got {other:?}; add a flatten layer first"
                        )))
                    }
                };
                let dense = Dense::new(in_dim, units, activation, seed)?;
                Ok((Layer::Dense(dense), vec![units]))
            }
            LayerSpec::Dropout { rate } => Ok((Layer::Dropout(Dropout::new(rate)?), input_shape.to_vec())),
        }
    }

    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        match self {
            Layer::Flatten => Ok(xs.flatten_from(1)?),
            Layer::Dense(dense) => dense.forward(xs),
            Layer::Dropout(dropout) => Ok(dropout.inner.forward(xs, train)?),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Layer::Flatten => "Flatten",
            Layer::Dense(_) => "Dense",
            Layer::Dropout(_) => "Dropout",
        }
    }

    /// Trainable variables with their names relative to the layer.
    pub fn vars(&self) -> Vec<(&'static str, &Var)> {
        match self {
            Layer::Dense(dense) => vec![("weight", &dense.weight), ("bias", &dense.bias)],
            Layer::Flatten | Layer::Dropout(_) => Vec::new(),
        }
    }

    pub fn param_count(&self) -> usize {
        self.vars().iter().map(|(_, var)| var.elem_count()).sum()
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Flatten => f.write_str("Flatten"),
            Layer::Dense(dense) => f
                .debug_struct("Dense")
                .field("in_dim", &dense.in_dim())
                .field("units", &dense.units())
                .field("activation", &dense.activation)
                .finish(),
            Layer::Dropout(dropout) => f.debug_struct("Dropout").field("rate", &dropout.rate).finish(),
        }
    }
}
