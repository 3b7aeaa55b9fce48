use std::time::Duration;
use tch::{Device, Kind};
use crate::training::error::MetricError;
use crate::training::step::StepOutput;

/// Area under the ROC curve of `scores` for a binary labelling, ties counted as half.
///
/// Returns `None` when either side of the labelling is empty.
pub fn binary_roc_auc(is_positive: &[bool], scores: &[f32]) -> Option<f64> {
    let positives = is_positive.iter().filter(|&&p| p).count();
    let negatives = is_positive.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // Sum of 1-based ranks of the positives, tied scores sharing their mean rank
    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        let mean_rank = (start + 1 + end) as f64 / 2.0;
        let tied_positives = order[start..end].iter().filter(|&&i| is_positive[i]).count();
        positive_rank_sum += mean_rank * tied_positives as f64;
        start = end;
    }

    let (p, n) = (positives as f64, negatives as f64);
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

/// Macro-averaged one-vs-rest ROC-AUC.
///
/// `scores` is row-major `[labels.len(), num_classes]`. Every class must appear both as a
/// label and as a non-label, otherwise the score is undefined.
pub fn roc_auc_ovr(labels: &[i64], scores: &[f32], num_classes: usize) -> Result<f64, MetricError> {
    if scores.len() != labels.len() * num_classes {
        return Err(MetricError::LengthMismatch {
            labels: labels.len(),
            expected: labels.len() * num_classes,
            actual: scores.len(),
        });
    }
    if let Some(&label) = labels.iter().find(|&&l| l < 0 || l as usize >= num_classes) {
        return Err(MetricError::InvalidLabel { label, num_classes });
    }
    if let Some(index) = scores.iter().position(|s| !s.is_finite()) {
        return Err(MetricError::NonFiniteScore { sample: index / num_classes, class: index % num_classes });
    }

    let mut total = 0.0;
    for class in 0..num_classes {
        let is_positive: Vec<bool> = labels.iter().map(|&l| l as usize == class).collect();
        let class_scores: Vec<f32> = scores.iter().skip(class).step_by(num_classes).copied().collect();
        match binary_roc_auc(&is_positive, &class_scores) {
            Some(auc) => total += auc,
            None => {
                let positives = is_positive.iter().filter(|&&p| p).count();
                return Err(MetricError::UndefinedAuc { class, positives, negatives: labels.len() - positives });
            }
        }
    }
    Ok(total / num_classes as f64)
}

/// Labels and predictions of every batch so far, in batch order.
#[derive(Debug, Default)]
struct PredictionBuffer {
    labels: Vec<i64>,
    scores: Vec<f32>,
    num_classes: usize,
}

/// Running epoch totals; predictions are only buffered when ROC-AUC will be computed.
#[derive(Debug)]
pub struct EpochAccumulator {
    num_batches: usize,
    loss_sum: f64,
    accuracy_sum: f64,
    duration: Duration,
    buffer: Option<PredictionBuffer>,
}

/// Summary of one epoch of one phase.
#[derive(Debug)]
pub struct EpochAggregate {
    pub num_batches: usize,
    /// Mean of the per-batch losses.
    pub loss: f64,
    /// Mean of the per-batch accuracies.
    pub accuracy: f64,
    pub duration: Duration,
    /// `None` when ROC-AUC was not due this epoch.
    pub auc: Option<Result<f64, MetricError>>,
}

impl EpochAccumulator {
    pub fn new(track_predictions: bool) -> EpochAccumulator {
        EpochAccumulator {
            num_batches: 0,
            loss_sum: 0.0,
            accuracy_sum: 0.0,
            duration: Duration::ZERO,
            buffer: track_predictions.then(PredictionBuffer::default),
        }
    }

    /// ROC-AUC is skipped on the first epoch.
    pub fn for_epoch(epoch: usize) -> EpochAccumulator {
        EpochAccumulator::new(epoch != 0)
    }

    pub fn tracks_predictions(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn push(&mut self, step: &StepOutput) -> Result<(), MetricError> {
        self.num_batches += 1;
        self.loss_sum += step.loss;
        self.accuracy_sum += step.accuracy;
        self.duration += step.duration;

        if let Some(buffer) = self.buffer.as_mut() {
            let num_classes = *step.predictions.size().last().unwrap_or(&0) as usize;
            if buffer.num_classes == 0 {
                buffer.num_classes = num_classes;
            }
            let labels = Vec::<i64>::try_from(&step.labels.to_device(Device::Cpu).to_kind(Kind::Int64))?;
            let scores = Vec::<f32>::try_from(
                &step.predictions.to_device(Device::Cpu).to_kind(Kind::Float).flatten(0, -1),
            )?;
            if num_classes != buffer.num_classes || scores.len() != labels.len() * num_classes {
                return Err(MetricError::LengthMismatch {
                    labels: labels.len(),
                    expected: labels.len() * buffer.num_classes,
                    actual: scores.len(),
                });
            }
            buffer.labels.extend(labels);
            buffer.scores.extend(scores);
        }
        Ok(())
    }

    pub fn finish(self) -> Result<EpochAggregate, MetricError> {
        if self.num_batches == 0 {
            return Err(MetricError::EmptyEpoch);
        }
        let n = self.num_batches as f64;
        Ok(EpochAggregate {
            num_batches: self.num_batches,
            loss: self.loss_sum / n,
            accuracy: self.accuracy_sum / n,
            duration: self.duration,
            auc: self
                .buffer
                .map(|buffer| roc_auc_ovr(&buffer.labels, &buffer.scores, buffer.num_classes)),
        })
    }
}
