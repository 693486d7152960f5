use std::collections::HashMap;
use std::path::Path;

use candle_core::{Device, Tensor, Var, D};

use crate::error::{Error, Result};
use crate::layer::{Layer, LayerSpec};

/// A linear stack of layers applied in order.
#[derive(Debug)]
pub struct Sequential {
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,
    layers: Vec<Layer>,
}

impl Sequential {
    /// Builds `specs` for inputs of `input_shape` (batch dimension
    /// excluded). Layer `i` is initialised with `seed + i`.
    pub fn new(input_shape: &[usize], specs: &[LayerSpec], seed: u64) -> Result<Self> {
        if specs.is_empty() {
            return Err(Error::Config("a model needs at least one layer".to_string()));
        }

        let mut shape = input_shape.to_vec();
        let mut layers = Vec::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            let (layer, next) = Layer::build(spec, &shape, seed.wrapping_add(i as u64))?;
            layers.push(layer);
            shape = next;
        }

        Ok(Self {
            input_shape: input_shape.to_vec(),
            output_shape: shape,
            layers,
        })
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    pub fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        self.forward_t(input, false)
    }

    pub fn forward_t(&self, input: &Tensor, train: bool) -> Result<Tensor> {
        let dims = input.dims();
        if dims.len() != self.input_shape.len() + 1 || dims[1..] != self.input_shape[..] {
            return Err(Error::Shape(format!(
                "model expects inputs of shape (batch, {:?}), got {dims:?}",
                self.input_shape
            )));
        }

        let mut current = input.clone();
        for layer in &self.layers {
            current = layer.forward_t(&current, train)?;
        }
        Ok(current)
    }

    /// Most likely class for every row of `input`.
    pub fn predict(&self, input: &Tensor) -> Result<Vec<u32>> {
        let output = self.forward(input)?;
        Ok(output.argmax(D::Minus1)?.to_vec1::<u32>()?)
    }

    pub fn named_vars(&self) -> Vec<(String, &Var)> {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(i, layer)| {
                layer
                    .vars()
                    .into_iter()
                    .map(move |(name, var)| (format!("layer{i}.{name}"), var))
            })
            .collect()
    }

    pub fn vars(&self) -> Vec<Var> {
        self.named_vars().into_iter().map(|(_, var)| var.clone()).collect()
    }

    pub fn param_count(&self) -> usize {
        self.layers.iter().map(Layer::param_count).sum()
    }

    /// Table of layers, output shapes and parameter counts.
    pub fn summary(&self) -> Vec<String> {
        let mut lines = vec![format!("{:<24}{:<20}{:>10}", "Layer (type)", "Output Shape", "Param #")];

        let mut shape = self.input_shape.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            shape = match layer {
                Layer::Flatten => vec![shape.iter().product()],
                Layer::Dense(dense) => vec![dense.units()],
                Layer::Dropout(_) => shape,
            };
            let dims: Vec<String> = shape.iter().map(usize::to_string).collect();
            lines.push(format!(
                "{:<24}{:<20}{:>10}",
                format!("{}_{i} ({})", layer.kind().to_lowercase(), layer.kind()),
                format!("(None, {})", dims.join(", ")),
                layer.param_count()
            ));
        }

        lines.push(format!("Total params: {}", self.param_count()));
        lines
    }

    /// Writes the weights as safetensors, keyed `layer{i}.weight` and
    /// `layer{i}.bias`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let tensors: HashMap<String, Tensor> = self
            .named_vars()
            .into_iter()
            .map(|(name, var)| (name, var.as_tensor().clone()))
            .collect();
        candle_core::safetensors::save(&tensors, path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), tensors = tensors.len(), "saved weights");
        Ok(())
    }

    /// Loads weights written by [`Sequential::save`] into this model. Every
    /// variable must be present with a matching shape.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut tensors = candle_core::safetensors::load(path.as_ref(), &Device::Cpu)?;
        for (name, var) in self.named_vars() {
            let tensor = tensors
                .remove(&name)
                .ok_or_else(|| Error::Shape(format!("'{name}' is missing from the weights file")))?;
            if tensor.dims() != var.dims() {
                return Err(Error::Shape(format!(
                    "'{name}' has shape {:?} in the weights file, model expects {:?}",
                    tensor.dims(),
                    var.dims()
                )));
            }
            var.set(&tensor)?;
        }
        if !tensors.is_empty() {
            tracing::warn!(unused = tensors.len(), "weights file has tensors the model does not use");
        }
        Ok(())
    }
}
