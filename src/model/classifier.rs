use tch::Tensor;
use crate::model::error::ShapeError;

/// Whether batch norm uses batch statistics and dropout is active.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
    Train,
    Eval,
}

impl Mode {
    pub const fn is_train(self) -> bool {
        matches!(self, Mode::Train)
    }
}

/// Maps a `[N, 1, H, W]` image batch to `[N, NUM_CLASSES]` raw logits.
pub trait Classifier {
    fn forward_t(&self, images: &Tensor, mode: Mode) -> Result<Tensor, ShapeError>;
}
