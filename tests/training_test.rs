mod common;

use fashion_mlp::activation_functions::Activation;
use fashion_mlp::config::TrainConfig;
use fashion_mlp::data::{normalize, FashionMnist, Pipeline};
use fashion_mlp::helpers::{confusion_matrix, evaluate_model};
use fashion_mlp::layer::LayerSpec;
use fashion_mlp::loss_functions::Loss;
use fashion_mlp::metrics::Metric;
use fashion_mlp::optimizer::OptimizerConfig;
use fashion_mlp::{Error, Sequential};

use common::{write_dataset, COLS, ROWS};

fn pipelines(dir: &std::path::Path) -> (Pipeline, Pipeline) {
    write_dataset(dir, 200, 50);
    let data = FashionMnist::load(dir).unwrap();
    let train = Pipeline::from_split(&data.train)
        .map(normalize)
        .cache()
        .shuffle(data.train.len(), 42)
        .batch(16)
        .prefetch(2);
    let test = Pipeline::from_split(&data.test).map(normalize).batch(16).cache();
    (train, test)
}

fn network() -> Sequential {
    let config = TrainConfig {
        hidden: vec![32],
        ..TrainConfig::default()
    };
    Sequential::new(&[ROWS, COLS], &config.layers(), 42).unwrap()
}

#[test]
fn fit_learns_a_separable_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let (train, test) = pipelines(dir.path());

    let mut model = network()
        .compile(
            OptimizerConfig::Adam { learning_rate: 0.01 },
            Loss::SparseCategoricalCrossentropy { from_logits: true },
            &[Metric::SparseCategoricalAccuracy],
        )
        .unwrap();

    let history = model.fit(&train, 25, Some(&test)).unwrap();
    assert_eq!(history.epochs.len(), 25);

    let first = &history.epochs[0];
    let last = history.last().unwrap();
    assert!(last.loss < first.loss, "{} !< {}", last.loss, first.loss);
    assert!(last.accuracy > 0.9, "train accuracy {}", last.accuracy);
    assert!(last.val_accuracy.unwrap() > 0.9, "val accuracy {:?}", last.val_accuracy);

    let accuracy = evaluate_model(&model, &test).unwrap();
    assert!((accuracy - last.val_accuracy.unwrap()).abs() < 1e-9);

    let matrix = confusion_matrix(model.network(), &test).unwrap();
    let total: u32 = matrix.iter().flatten().sum();
    assert_eq!(total, 50);
}

#[test]
fn sgd_with_dropout_trains() {
    let dir = tempfile::tempdir().unwrap();
    let (train, _) = pipelines(dir.path());

    let specs = vec![
        LayerSpec::Flatten,
        LayerSpec::dense(32, Activation::Relu),
        LayerSpec::Dropout { rate: 0.1 },
        LayerSpec::dense(10, Activation::Softmax),
    ];
    let mut model = Sequential::new(&[ROWS, COLS], &specs, 1)
        .unwrap()
        .compile(
            OptimizerConfig::Sgd { learning_rate: 0.5 },
            Loss::SparseCategoricalCrossentropy { from_logits: false },
            &[Metric::SparseCategoricalAccuracy],
        )
        .unwrap()
        .with_log_every(5);

    let history = model.fit(&train, 15, None).unwrap();
    let last = history.last().unwrap();
    assert!(last.val_loss.is_none());
    assert!(last.loss < history.epochs[0].loss);
}

#[test]
fn saved_weights_reproduce_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let (train, test) = pipelines(dir.path());

    let mut model = network()
        .compile(OptimizerConfig::default(), Loss::default(), &[Metric::SparseCategoricalAccuracy])
        .unwrap();
    model.fit(&train, 2, None).unwrap();

    let path = dir.path().join("weights.safetensors");
    model.network().save(&path).unwrap();

    let restored = Sequential::new(&[ROWS, COLS], &TrainConfig { hidden: vec![32], ..TrainConfig::default() }.layers(), 7).unwrap();
    restored.load(&path).unwrap();

    let batch = test.epoch(0).unwrap().next().unwrap().unwrap();
    assert_eq!(model.predict(&batch.images).unwrap(), restored.predict(&batch.images).unwrap());

    let loss = Loss::default();
    let a = model.evaluate(&test).unwrap();
    let b = restored.evaluate(&test, &loss).unwrap();
    assert!((a.loss - b.loss).abs() < 1e-6);
}

#[test]
fn loading_into_a_different_architecture_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weights.safetensors");
    network().save(&path).unwrap();

    let wider = TrainConfig {
        hidden: vec![64],
        ..TrainConfig::default()
    };
    let other = Sequential::new(&[ROWS, COLS], &wider.layers(), 0).unwrap();
    assert!(matches!(other.load(&path), Err(Error::Shape(_))));
}

#[test]
fn fit_rejects_zero_epochs() {
    let dir = tempfile::tempdir().unwrap();
    let (train, _) = pipelines(dir.path());
    let mut model = network()
        .compile(OptimizerConfig::default(), Loss::default(), &[Metric::SparseCategoricalAccuracy])
        .unwrap();
    assert!(matches!(model.fit(&train, 0, None), Err(Error::Config(_))));
}
