use std::io;
use tch::TchError;
use thiserror::Error;
use crate::model::error::{ConfigError, ShapeError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetricError {
    /// One-vs-rest AUC needs at least one positive and one negative sample per class.
    #[error("ROC-AUC is undefined: class {class} has {positives} positive and {negatives} negative samples")]
    UndefinedAuc { class: usize, positives: usize, negatives: usize },

    #[error("Expected {expected} scores for {labels} labels, got {actual}")]
    LengthMismatch { labels: usize, expected: usize, actual: usize },

    #[error("Label {label} is outside 0..{num_classes}")]
    InvalidLabel { label: i64, num_classes: usize },

    #[error("Score of sample {sample} for class {class} is not finite")]
    NonFiniteScore { sample: usize, class: usize },

    #[error("Cannot aggregate an epoch without batches")]
    EmptyEpoch,

    #[error("Could not read step output: {0}")]
    Conversion(String),
}

impl From<TchError> for MetricError {
    fn from(err: TchError) -> Self {
        MetricError::Conversion(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Metric(#[from] MetricError),

    #[error(transparent)]
    Tch(#[from] TchError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("Monitored metric `{0}` was not logged this epoch")]
    MissingMetric(String),

    #[error("Failed to write checkpoint: {0}")]
    Checkpoint(String),
}
