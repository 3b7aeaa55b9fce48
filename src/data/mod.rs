pub mod dataset;
pub mod cifar;

pub use dataset::{Batch, ImageDataset};
