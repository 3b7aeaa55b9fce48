use thiserror::Error;
use crate::model::variant::Variant;

/// Raised while building a network, before any forward pass runs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid hyperparameter `{name}`: {reason}")]
    InvalidHyperparameter { name: &'static str, reason: String },

    #[error("Variant {0} requires `patch_size`")]
    MissingPatchSize(Variant),

    #[error("Patch size {patch_size} does not evenly divide a {height}x{width} image")]
    IndivisiblePatchSize { patch_size: i64, height: i64, width: i64 },

    #[error("Patch size {patch_size} cannot be pooled into {num_spatial_bins}x{num_spatial_bins} cells (pooling yields {actual}x{actual})")]
    DescriptorGeometry { patch_size: i64, num_spatial_bins: i64, actual: i64 },
}

/// A tensor reached a layer with a shape the configuration did not predict.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ShapeError {
    #[error("Expected input of shape {expected:?}, got {actual:?}")]
    UnexpectedInput { expected: Vec<i64>, actual: Vec<i64> },

    #[error("Projection `{layer}` expects {expected} input features, got {actual}")]
    ProjectionInput { layer: &'static str, expected: i64, actual: i64 },

    #[error("Image of {height}x{width} cannot be split into {patch_size}x{patch_size} patches")]
    IndivisibleImage { patch_size: i64, height: i64, width: i64 },
}
