use std::time::{Duration, Instant};
use tch::{nn, Kind, Tensor};
use crate::data::Batch;
use crate::model::classifier::{Classifier, Mode};
use crate::model::error::ShapeError;

/// What one batch contributes to its epoch's aggregate.
#[derive(Debug)]
pub struct StepOutput {
    pub labels: Tensor,
    /// Softmax over the logits, detached from the graph.
    pub predictions: Tensor,
    pub loss: f64,
    pub accuracy: f64,
    pub duration: Duration,
}

/// Fraction of rows whose arg-max matches the label.
pub fn accuracy(logits: &Tensor, labels: &Tensor) -> f64 {
    let batch_size = labels.size()[0];
    let correct = logits
        .argmax(-1, false)
        .eq_tensor(labels)
        .to_kind(Kind::Float)
        .sum(Kind::Float)
        .double_value(&[]);
    correct / batch_size as f64
}

fn check_labels(images: &Tensor, labels: &Tensor) -> Result<(), ShapeError> {
    let batch_size = images.size().first().copied().unwrap_or(0);
    if labels.size() != [batch_size] {
        return Err(ShapeError::UnexpectedInput { expected: vec![batch_size], actual: labels.size() });
    }
    Ok(())
}

/// Forward pass, loss and metrics for one batch, updating the model if an optimizer is provided.
///
/// With an optimizer the model runs in train mode and the update is applied only after the
/// loss of this batch is known; without one it runs in eval mode with gradients disabled.
pub fn run_step(
    model: &dyn Classifier,
    optimizer: Option<&mut nn::Optimizer>,
    batch: &Batch,
) -> Result<StepOutput, ShapeError> {
    let start = Instant::now();
    check_labels(&batch.images, &batch.labels)?;

    let (logits, loss) = match optimizer {
        Some(opt) => {
            let logits = model.forward_t(&batch.images, Mode::Train)?;
            let loss = logits.cross_entropy_for_logits(&batch.labels);
            opt.zero_grad();
            loss.backward();
            opt.step();
            (logits, loss)
        }
        None => tch::no_grad(|| -> Result<(Tensor, Tensor), ShapeError> {
            let logits = model.forward_t(&batch.images, Mode::Eval)?;
            let loss = logits.cross_entropy_for_logits(&batch.labels);
            Ok((logits, loss))
        })?,
    };

    assert_eq!(loss.size(), [] as [i64; 0]);

    let predictions = logits.detach().softmax(-1, Kind::Float);
    let accuracy = accuracy(&logits, &batch.labels);

    Ok(StepOutput {
        labels: batch.labels.shallow_clone(),
        predictions,
        loss: loss.double_value(&[]),
        accuracy,
        duration: start.elapsed(),
    })
}

/// Update the model parameters given a batch of training data
pub fn train_step(model: &dyn Classifier, optimizer: &mut nn::Optimizer, batch: &Batch) -> Result<StepOutput, ShapeError> {
    run_step(model, Some(optimizer), batch)
}

/// Same computation as training, without touching the parameters
pub fn validation_step(model: &dyn Classifier, batch: &Batch) -> Result<StepOutput, ShapeError> {
    run_step(model, None, batch)
}
