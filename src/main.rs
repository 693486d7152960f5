use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format;

use fashion_mlp::config::{TrainConfig, TrainOverrides};
use fashion_mlp::data::{class_name, normalize, FashionMnist, Pipeline, Split};
use fashion_mlp::helpers::{confusion_matrix, per_class_accuracy};
use fashion_mlp::loss_functions::Loss;
use fashion_mlp::metrics::Metric;
use fashion_mlp::Sequential;

use self::args::{Args, Command, EvaluateArgs, TrainArgs};

mod args;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let event_format = format().with_target(false).without_time();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(event_format)
        .init();

    match args.command {
        Command::Train(args) => run_train(args),
        Command::Evaluate(args) => run_evaluate(args),
    }
}

fn load_config(path: Option<&Path>, overrides: TrainOverrides) -> anyhow::Result<TrainConfig> {
    let mut config = match path {
        Some(path) => TrainConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => TrainConfig::default(),
    };
    config.apply_overrides(overrides)?;
    Ok(config)
}

fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref(), args.overrides())?;
    let data = FashionMnist::load(&config.data_dir)?;

    let (train_split, validation_split): (Split, Split) = match config.validation_split {
        Some(ratio) => data.train.split_validation(ratio, config.seed)?,
        None => (data.train, data.test),
    };

    let buffer = config.shuffle_buffer.unwrap_or(train_split.len());
    let train = Pipeline::from_split(&train_split)
        .map(normalize)
        .cache()
        .shuffle(buffer, config.seed)
        .batch(config.batch_size)
        .prefetch(config.prefetch);
    let validation = Pipeline::from_split(&validation_split)
        .map(normalize)
        .batch(config.batch_size)
        .cache()
        .prefetch(config.prefetch);

    let network = Sequential::new(&train_split.image_shape(), &config.layers(), config.seed)?;
    let mut model = network
        .compile(
            config.optimizer,
            Loss::SparseCategoricalCrossentropy { from_logits: true },
            &[Metric::SparseCategoricalAccuracy],
        )?
        .with_log_every(config.log_every);

    let history = model.fit(&train, config.epochs, Some(&validation))?;
    if let Some(last) = history.last() {
        info!(
            loss = last.loss,
            accuracy = last.accuracy,
            val_accuracy = ?last.val_accuracy,
            "training finished"
        );
    }

    if let Some(path) = &args.save_weights {
        model.network().save(path)?;
    }
    if let Some(path) = &args.history {
        history.save(path)?;
        info!(path = %path.display(), "saved history");
    }
    if let Some(path) = &args.save_config {
        config.save(path)?;
        info!(path = %path.display(), "saved config");
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref(), args.overrides())?;

    let data = FashionMnist::load(&config.data_dir)?;
    let test = Pipeline::from_split(&data.test)
        .map(normalize)
        .batch(args.batch_size)
        .cache();

    let network = Sequential::new(&data.test.image_shape(), &config.layers(), config.seed)?;
    network
        .load(&args.weights)
        .with_context(|| format!("loading weights from {}", args.weights.display()))?;

    let loss = Loss::SparseCategoricalCrossentropy { from_logits: true };
    let evaluation = network.evaluate(&test, &loss)?;
    info!(
        examples = evaluation.examples,
        loss = evaluation.loss,
        accuracy = evaluation.accuracy,
        "test set"
    );

    let matrix = confusion_matrix(&network, &test)?;
    for (class, accuracy) in per_class_accuracy(&matrix).iter().enumerate() {
        let name = class_name(class as u8).unwrap_or("?");
        match accuracy {
            Some(accuracy) => info!("{name:>12}: {:.2}%", accuracy * 100.0),
            None => info!("{name:>12}: no examples"),
        }
    }
    Ok(())
}
