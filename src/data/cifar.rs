use std::path::Path;
use tch::vision::cifar;
use tch::{Kind, TchError, Tensor};
use tracing::info;
use crate::data::dataset::ImageDataset;

// ITU-R 601-2 luma, as used for PIL's "L" conversion
const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Collapses `[N, 3, H, W]` RGB images into `[N, 1, H, W]` luminance.
pub fn to_grayscale(rgb: &Tensor) -> Tensor {
    let weights = Tensor::from_slice(&LUMA_WEIGHTS)
        .view([1, 3, 1, 1])
        .to_device(rgb.device());
    (rgb.to_kind(Kind::Float) * weights).sum_dim_intlist(&[1i64][..], true, Kind::Float)
}

/// Loads the CIFAR-10 binary batches from `dir` as grayscale (train, test) sets.
pub fn load_grayscale(dir: impl AsRef<Path>) -> Result<(ImageDataset, ImageDataset), TchError> {
    let dataset = cifar::load_dir(dir)?;
    info!(
        train = dataset.train_labels.size()[0],
        test = dataset.test_labels.size()[0],
        classes = dataset.labels,
        "loaded CIFAR-10"
    );

    let train = ImageDataset::new(to_grayscale(&dataset.train_images), dataset.train_labels)
        .map_err(|e| TchError::Shape(e.to_string()))?;
    let test = ImageDataset::new(to_grayscale(&dataset.test_images), dataset.test_labels)
        .map_err(|e| TchError::Shape(e.to_string()))?;
    Ok((train, test))
}
