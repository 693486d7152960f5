use std::path::PathBuf;

use clap::{Args as ArgsTrait, Parser, Subcommand, ValueEnum};
use fashion_mlp::config::TrainOverrides;
use fashion_mlp::optimizer;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Trains a dense classifier on Fashion-MNIST.
    Train(TrainArgs),
    /// Evaluates saved weights on the Fashion-MNIST test split.
    Evaluate(EvaluateArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OptimizerKind {
    Adam,
    Sgd,
}

impl From<OptimizerKind> for optimizer::OptimizerKind {
    fn from(kind: OptimizerKind) -> Self {
        match kind {
            OptimizerKind::Adam => optimizer::OptimizerKind::Adam,
            OptimizerKind::Sgd => optimizer::OptimizerKind::Sgd,
        }
    }
}

#[derive(ArgsTrait, Clone, Debug)]
pub struct TrainArgs {
    /// A JSON training configuration. Flags given on the command line
    /// override its values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding the four IDX files (optionally gzipped).
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long)]
    pub epochs: Option<usize>,

    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Shuffle buffer size. Defaults to the whole training split.
    #[arg(long)]
    pub shuffle_buffer: Option<usize>,

    /// Units of each hidden layer, e.g. `256,128`.
    #[arg(long, value_delimiter = ',')]
    pub hidden: Option<Vec<usize>>,

    #[arg(long)]
    pub dropout: Option<f32>,

    #[arg(long, value_enum)]
    pub optimizer: Option<OptimizerKind>,

    #[arg(short, long)]
    pub learning_rate: Option<f64>,

    /// Validate on this fraction of the training split instead of the test split.
    #[arg(long)]
    pub validation_split: Option<f64>,

    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Where to write the trained weights, in safetensors format.
    #[arg(long)]
    pub save_weights: Option<PathBuf>,

    /// Where to write the per-epoch history, as JSON.
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Where to write the effective configuration, as JSON.
    #[arg(long)]
    pub save_config: Option<PathBuf>,
}

impl TrainArgs {
    pub fn overrides(&self) -> TrainOverrides {
        TrainOverrides {
            data_dir: self.data_dir.clone(),
            epochs: self.epochs,
            batch_size: self.batch_size,
            shuffle_buffer: self.shuffle_buffer,
            hidden: self.hidden.clone(),
            dropout: self.dropout,
            validation_split: self.validation_split,
            seed: self.seed,
            optimizer: self.optimizer.map(Into::into),
            learning_rate: self.learning_rate,
        }
    }
}

#[derive(ArgsTrait, Clone, Debug)]
pub struct EvaluateArgs {
    /// Weights written by `train --save-weights`.
    #[arg(short, long)]
    pub weights: PathBuf,

    /// The configuration the weights were trained with. Only the data
    /// directory, hidden layers and dropout are used.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    #[arg(long, value_delimiter = ',')]
    pub hidden: Option<Vec<usize>>,

    /// Dropout rate the weights were trained with. Dropout layers shift the
    /// layer indices weights are stored under, so it must match training.
    #[arg(long)]
    pub dropout: Option<f32>,

    #[arg(short, long, default_value_t = 128)]
    pub batch_size: usize,
}

impl EvaluateArgs {
    pub fn overrides(&self) -> TrainOverrides {
        TrainOverrides {
            data_dir: self.data_dir.clone(),
            hidden: self.hidden.clone(),
            dropout: self.dropout,
            ..TrainOverrides::default()
        }
    }
}
