use crate::data::{Pipeline, NUM_CLASSES};
use crate::error::{Error, Result};
use crate::mlp::Sequential;
use crate::training::Model;

pub type ConfusionMatrix = [[u32; NUM_CLASSES]; NUM_CLASSES];

pub fn evaluate_model(model: &Model, pipeline: &Pipeline) -> Result<f64> {
    Ok(model.evaluate(pipeline)?.accuracy)
}

/// Counts of `(true class, predicted class)` over one pass of `pipeline`.
pub fn confusion_matrix(network: &Sequential, pipeline: &Pipeline) -> Result<ConfusionMatrix> {
    if network.output_shape() != [NUM_CLASSES] {
        return Err(Error::Shape(format!(
            "confusion matrix needs {NUM_CLASSES} outputs, model has {:?}",
            network.output_shape()
        )));
    }

    let mut matrix = [[0u32; NUM_CLASSES]; NUM_CLASSES];
    for batch in pipeline.epoch(0)? {
        let batch = batch?;
        let predictions = network.predict(&batch.images)?;
        let labels = batch.labels.to_vec1::<u32>()?;
        for (&truth, &predicted) in labels.iter().zip(&predictions) {
            matrix[truth as usize][predicted as usize] += 1;
        }
    }
    Ok(matrix)
}

/// Fraction of each class predicted correctly; `None` when a class never
/// occurs.
pub fn per_class_accuracy(matrix: &ConfusionMatrix) -> [Option<f64>; NUM_CLASSES] {
    let mut accuracy = [None; NUM_CLASSES];
    for (class, row) in matrix.iter().enumerate() {
        let total: u32 = row.iter().sum();
        if total > 0 {
            accuracy[class] = Some(row[class] as f64 / total as f64);
        }
    }
    accuracy
}
