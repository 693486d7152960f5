use std::time::Instant;

use candle_core::Tensor;
use tracing::{debug, info, warn};

use crate::data::Pipeline;
use crate::error::{Error, Result};
use crate::loss_functions::Loss;
use crate::metrics::{EpochLogs, Evaluation, History, Mean, Metric, MetricState};
use crate::mlp::Sequential;
use crate::optimizer::{Optimizer, OptimizerConfig};

/// A network bound to its optimizer, loss and metrics, ready to be fit.
pub struct Model {
    network: Sequential,
    optimizer: Optimizer,
    loss: Loss,
    metrics: Vec<Metric>,
    log_every: usize,
}

impl Sequential {
    pub fn compile(self, optimizer: OptimizerConfig, loss: Loss, metrics: &[Metric]) -> Result<Model> {
        let optimizer = optimizer.build(self.vars())?;
        for line in self.summary() {
            info!("{line}");
        }
        Ok(Model {
            network: self,
            optimizer,
            loss,
            metrics: metrics.to_vec(),
            log_every: 100,
        })
    }

    /// Runs `pipeline` once in inference mode. The loss is averaged per
    /// example; accuracy is sparse categorical accuracy.
    pub fn evaluate(&self, pipeline: &Pipeline, loss: &Loss) -> Result<Evaluation> {
        if pipeline.is_empty() {
            return Err(Error::Config("cannot evaluate on an empty dataset".to_string()));
        }

        let mut mean = Mean::default();
        let mut accuracy = Metric::SparseCategoricalAccuracy.state();
        for batch in pipeline.epoch(0)? {
            let batch = batch?;
            let output = self.forward(&batch.images)?;
            let value = loss.compute(&output, &batch.labels)?.to_scalar::<f32>()?;
            mean.update(value as f64, batch.len());
            accuracy.update(&output, &batch.labels)?;
        }

        Ok(Evaluation {
            loss: mean.result(),
            accuracy: accuracy.result(),
            examples: pipeline.len(),
        })
    }
}

impl Model {
    /// Emit a debug line every `steps` training steps; zero disables it.
    pub fn with_log_every(mut self, steps: usize) -> Self {
        self.log_every = steps;
        self
    }

    pub fn network(&self) -> &Sequential {
        &self.network
    }

    pub fn into_network(self) -> Sequential {
        self.network
    }

    pub fn loss(&self) -> Loss {
        self.loss
    }

    pub fn fit(&mut self, train: &Pipeline, epochs: usize, validation: Option<&Pipeline>) -> Result<History> {
        if epochs == 0 {
            return Err(Error::Config("epochs must be at least 1".to_string()));
        }
        if train.is_empty() {
            return Err(Error::Config("cannot fit on an empty dataset".to_string()));
        }
        let validation = match validation {
            Some(v) if v.is_empty() => {
                warn!("validation set is empty, skipping validation");
                None
            }
            other => other,
        };

        info!(
            examples = train.len(),
            batches = train.num_batches(),
            epochs,
            learning_rate = self.optimizer.learning_rate(),
            "starting training"
        );

        let mut history = History::default();
        for epoch in 0..epochs {
            let started = Instant::now();
            let (loss, metrics) = self.train_epoch(train, epoch)?;

            let accuracy = metrics
                .iter()
                .find(|state| state.metric() == Metric::SparseCategoricalAccuracy)
                .map(MetricState::result)
                .unwrap_or(f64::NAN);

            let (val_loss, val_accuracy) = match validation {
                Some(pipeline) => {
                    let eval = self.network.evaluate(pipeline, &self.loss)?;
                    (Some(eval.loss), Some(eval.accuracy))
                }
                None => (None, None),
            };

            let logs = EpochLogs {
                epoch: epoch + 1,
                epochs,
                loss,
                accuracy,
                val_loss,
                val_accuracy,
                seconds: started.elapsed().as_secs_f64(),
            };
            info!("{logs}");
            history.epochs.push(logs);
        }

        Ok(history)
    }

    fn train_epoch(&mut self, train: &Pipeline, epoch: usize) -> Result<(f64, Vec<MetricState>)> {
        let mut mean = Mean::default();
        let mut metrics: Vec<MetricState> = self.metrics.iter().map(Metric::state).collect();

        for (step, batch) in train.epoch(epoch)?.enumerate() {
            let batch = batch?;
            let output = self.network.forward_t(&batch.images, true)?;
            let loss = self.loss.compute(&output, &batch.labels)?;
            self.optimizer.backward_step(&loss)?;

            let value = loss.to_scalar::<f32>()? as f64;
            if !value.is_finite() {
                warn!(epoch = epoch + 1, step = step + 1, "loss is not finite");
            }
            mean.update(value, batch.len());
            for state in metrics.iter_mut() {
                state.update(&output, &batch.labels)?;
            }

            if self.log_every > 0 && (step + 1) % self.log_every == 0 {
                debug!(
                    epoch = epoch + 1,
                    step = step + 1,
                    loss = mean.result(),
                    "training"
                );
            }
        }

        Ok((mean.result(), metrics))
    }

    pub fn evaluate(&self, pipeline: &Pipeline) -> Result<Evaluation> {
        self.network.evaluate(pipeline, &self.loss)
    }

    pub fn predict(&self, input: &Tensor) -> Result<Vec<u32>> {
        self.network.predict(input)
    }
}
