use tch::{nn, Tensor};
use crate::model::classifier::Mode;
use crate::model::constants::{NUM_CLASSES, NUM_EMBEDDING_FEATURES};
use crate::model::error::ShapeError;

/// Fully-connected layer followed by ReLU and dropout, with its input width checked.
#[derive(Debug)]
pub struct Projection {
    name: &'static str,
    fc: nn::Linear,
    in_features: i64,
    dropout: f64,
}

impl Projection {
    pub fn new(vs: &nn::Path, name: &'static str, in_features: i64, out_features: i64, dropout: f64) -> Projection {
        Projection {
            name,
            fc: nn::linear(vs / name, in_features, out_features, Default::default()),
            in_features,
            dropout,
        }
    }

    pub const fn in_features(&self) -> i64 {
        self.in_features
    }

    /// `x` must be `[N, in_features]`.
    pub fn forward(&self, x: &Tensor, mode: Mode) -> Result<Tensor, ShapeError> {
        let actual = x.size().get(1).copied().unwrap_or(0);
        if x.dim() != 2 || actual != self.in_features {
            return Err(ShapeError::ProjectionInput { layer: self.name, expected: self.in_features, actual });
        }
        Ok(x.apply(&self.fc).relu().dropout(self.dropout, mode.is_train()))
    }
}

/// 1024-wide embedding followed by the classification layer producing raw logits.
#[derive(Debug)]
pub struct FusionHead {
    embedding: Projection,
    outputs: nn::Linear,
}

impl FusionHead {
    pub fn new(vs: &nn::Path, in_features: i64, dropout: f64) -> FusionHead {
        FusionHead {
            embedding: Projection::new(vs, "vvs_fc", in_features, NUM_EMBEDDING_FEATURES, dropout),
            outputs: nn::linear(vs / "outputs", NUM_EMBEDDING_FEATURES, NUM_CLASSES, Default::default()),
        }
    }

    pub const fn in_features(&self) -> i64 {
        self.embedding.in_features()
    }

    pub fn forward(&self, features: &Tensor, mode: Mode) -> Result<Tensor, ShapeError> {
        Ok(self.embedding.forward(features, mode)?.apply(&self.outputs))
    }
}
