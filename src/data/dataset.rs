use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tch::data::Iter2;
use tch::{Device, Kind, Tensor};
use crate::model::error::ShapeError;

/// One batch of images `[N, C, H, W]` with integer labels `[N]`.
#[derive(Debug)]
pub struct Batch {
    pub images: Tensor,
    pub labels: Tensor,
}

/// Labelled images held in memory.
#[derive(Debug)]
pub struct ImageDataset {
    images: Tensor,
    labels: Tensor,
}

impl ImageDataset {
    pub fn new(images: Tensor, labels: Tensor) -> Result<ImageDataset, ShapeError> {
        let image_size = images.size();
        let label_size = labels.size();
        if image_size.len() != 4 || label_size.len() != 1 || image_size[0] != label_size[0] {
            return Err(ShapeError::UnexpectedInput {
                expected: vec![image_size.first().copied().unwrap_or(-1)],
                actual: label_size,
            });
        }
        Ok(ImageDataset {
            images: images.to_kind(Kind::Float),
            labels: labels.to_kind(Kind::Int64),
        })
    }

    pub fn len(&self) -> usize {
        self.labels.size()[0] as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `[C, H, W]` of every image.
    pub fn image_shape(&self) -> [i64; 3] {
        let size = self.images.size();
        [size[1], size[2], size[3]]
    }

    pub fn images(&self) -> &Tensor {
        &self.images
    }

    pub fn labels(&self) -> &Tensor {
        &self.labels
    }

    pub fn subset(&self, indices: &[i64]) -> ImageDataset {
        let index = Tensor::from_slice(indices).to_device(self.images.device());
        ImageDataset {
            images: self.images.index_select(0, &index),
            labels: self.labels.index_select(0, &index.to_device(self.labels.device())),
        }
    }

    /// Splits into (train, validation), the validation part holding `val_fraction` of the samples.
    pub fn random_split(&self, val_fraction: f64, seed: u64) -> (ImageDataset, ImageDataset) {
        let len = self.len();
        let val_size = ((len as f64) * val_fraction.clamp(0.0, 1.0)) as usize;

        let mut indices: Vec<i64> = (0..len as i64).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(seed));

        let (val_indices, train_indices) = indices.split_at(val_size);
        (self.subset(train_indices), self.subset(val_indices))
    }

    /// Draws `n` distinct samples (all of them if `n >= len`).
    pub fn sample(&self, n: usize, rng: &mut fastrand::Rng) -> ImageDataset {
        let mut indices: Vec<i64> = (0..self.len() as i64).collect();
        rng.shuffle(&mut indices);
        indices.truncate(n);
        self.subset(&indices)
    }

    /// Iterates over batches moved to `device`; the last batch may be smaller.
    pub fn batches(&self, batch_size: usize, shuffle: bool, device: Device) -> impl Iterator<Item = Batch> {
        let mut iter = Iter2::new(&self.images, &self.labels, batch_size as i64);
        if shuffle {
            iter.shuffle();
        }
        iter.to_device(device).return_smaller_last_batch();
        iter.map(|(images, labels)| Batch { images, labels })
    }
}
