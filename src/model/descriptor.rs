use std::f64::consts::PI;
use tch::{Device, Kind, Tensor};
use crate::hparams::DescriptorConfig;
use crate::model::constants::{DESCRIPTOR_EPS, NORMALIZE_EPS};
use crate::model::error::{ConfigError, ShapeError};

/// Classical SIFT patch descriptor applied over a grid of non-overlapping patches.
///
/// Each patch of each channel is described independently:
/// central-difference gradients are weighted by a Gaussian window, soft-binned into
/// `num_ang_bins` orientations and pooled into `num_spatial_bins`² cells with a
/// triangular kernel. The histogram is L2-normalized, clipped, renormalized and
/// optionally square-rooted (RootSIFT). There are no learned parameters.
#[derive(Debug)]
pub struct SiftDescriptor {
    patch_size: i64,
    config: DescriptorConfig,
    bin_stride: i64,
    pad: i64,
    gaussian: Tensor,
    pooling_kernel: Tensor,
}

/// Normalized Gaussian window of `size` taps, centered like a `size`-pixel patch.
fn gaussian_1d(size: i64, sigma: f64) -> Vec<f64> {
    let offset = if size % 2 == 0 { 0.5 } else { 0.0 };
    let taps: Vec<f64> = (0..size)
        .map(|i| (i - size / 2) as f64 + offset)
        .map(|x| (-x * x / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f64 = taps.iter().sum();
    taps.into_iter().map(|t| t / sum).collect()
}

/// Separable triangular kernel that bilinearly spreads a pixel over neighbouring cells.
fn triangular_1d(size: i64) -> Vec<f64> {
    let half = size as f64 / 2.0;
    (0..size)
        .map(|i| half - (i as f64 + 0.5 - half).abs())
        .collect()
}

fn outer(a: &[f64], b: &[f64]) -> Vec<f32> {
    a.iter()
        .flat_map(|x| b.iter().map(move |y| (x * y) as f32))
        .collect()
}

fn l2_normalize(x: &Tensor) -> Tensor {
    let norm = x
        .square()
        .sum_dim_intlist(&[1i64][..], true, Kind::Float)
        .sqrt()
        .clamp_min(NORMALIZE_EPS);
    x / norm
}

fn l1_normalize(x: &Tensor) -> Tensor {
    let norm = x
        .abs()
        .sum_dim_intlist(&[1i64][..], true, Kind::Float)
        .clamp_min(NORMALIZE_EPS);
    x / norm
}

impl SiftDescriptor {
    pub fn new(patch_size: i64, config: DescriptorConfig, device: Device) -> Result<Self, ConfigError> {
        let num_spatial_bins = config.num_spatial_bins;
        let bin_ksize = 2 * (patch_size / (num_spatial_bins + 1));
        let bin_stride = patch_size / num_spatial_bins;
        let pad = bin_ksize / 4;

        let pooled = if bin_ksize > 0 && bin_stride > 0 {
            (patch_size + 2 * pad - bin_ksize) / bin_stride + 1
        } else {
            0
        };
        if pooled != num_spatial_bins {
            return Err(ConfigError::DescriptorGeometry { patch_size, num_spatial_bins, actual: pooled });
        }

        let window = gaussian_1d(patch_size, patch_size as f64 / 2f64.sqrt());
        let gaussian = Tensor::from_slice(&outer(&window, &window))
            .view([patch_size, patch_size])
            .to_device(device);

        // Peak of one unit per axis
        let half = bin_ksize as f64 / 2.0;
        let triangle: Vec<f64> = triangular_1d(bin_ksize).iter().map(|t| t / half).collect();
        let pooling_kernel = Tensor::from_slice(&outer(&triangle, &triangle))
            .view([1, 1, bin_ksize, bin_ksize])
            .to_device(device);

        Ok(SiftDescriptor { patch_size, config, bin_stride, pad, gaussian, pooling_kernel })
    }

    pub const fn patch_size(&self) -> i64 {
        self.patch_size
    }

    pub const fn descriptor_dim(&self) -> i64 {
        self.config.descriptor_dim()
    }

    /// Describes a batch of images `[B, C, H, W]`.
    ///
    /// Returns `[B * P, C, D]` where `P = (H / ps) * (W / ps)` patches are taken row-major
    /// within each image, so rows belonging to one image are contiguous.
    pub fn forward(&self, images: &Tensor) -> Result<Tensor, ShapeError> {
        let size = images.size();
        if size.len() != 4 {
            return Err(ShapeError::UnexpectedInput { expected: vec![-1, -1, -1, -1], actual: size });
        }
        let (channels, height, width) = (size[1], size[2], size[3]);
        let ps = self.patch_size;
        if height % ps != 0 || width % ps != 0 {
            return Err(ShapeError::IndivisibleImage { patch_size: ps, height, width });
        }

        // [B, C, nh, nw, ps, ps] -> [B, nh, nw, C, ps, ps]
        let patches = images
            .unfold(2, ps, ps)
            .unfold(3, ps, ps)
            .permute([0, 2, 3, 1, 4, 5])
            .contiguous()
            .view([-1, 1, ps, ps]);

        Ok(self.describe_patches(&patches).view([-1, channels, self.descriptor_dim()]))
    }

    /// Describes single-channel patches `[M, 1, ps, ps]`, returning `[M, D]`.
    pub fn describe_patches(&self, patches: &Tensor) -> Tensor {
        let ps = self.patch_size;
        let num_patches = patches.size()[0];
        let device = patches.device();
        let kind = patches.kind();

        let padded = patches.replication_pad2d([1, 1, 1, 1]);
        let gx = (padded.narrow(2, 1, ps).narrow(3, 2, ps) - padded.narrow(2, 1, ps).narrow(3, 0, ps)) * 0.5;
        let gy = (padded.narrow(2, 2, ps).narrow(3, 1, ps) - padded.narrow(2, 0, ps).narrow(3, 1, ps)) * 0.5;

        let magnitude = (&gx * &gx + &gy * &gy + DESCRIPTOR_EPS).sqrt();
        let orientation = gy.atan2(&(&gx + DESCRIPTOR_EPS)) + 2.0 * PI;
        let magnitude = magnitude * self.gaussian.to_device(device).to_kind(kind);

        // Soft assignment of each orientation to its two nearest bins
        let num_ang_bins = self.config.num_ang_bins as f64;
        let scaled = orientation * (num_ang_bins / (2.0 * PI));
        let lower_bin_unwrapped = scaled.floor();
        let upper_fraction = &scaled - &lower_bin_unwrapped;
        let lower_bin = lower_bin_unwrapped.remainder(num_ang_bins);
        let upper_bin = (&lower_bin + 1.0).remainder(num_ang_bins);
        let lower_weight = (upper_fraction.neg() + 1.0) * &magnitude;
        let upper_weight = upper_fraction * &magnitude;

        let kernel = self.pooling_kernel.to_device(device).to_kind(kind);
        let stride = self.bin_stride;
        let pad = self.pad;
        let planes: Vec<Tensor> = (0..self.config.num_ang_bins)
            .map(|bin| {
                let plane = lower_bin.eq(bin as f64).to_kind(kind) * &lower_weight
                    + upper_bin.eq(bin as f64).to_kind(kind) * &upper_weight;
                plane.conv2d(&kernel, None::<Tensor>, [stride, stride], [pad, pad], [1, 1], 1)
            })
            .collect();

        let histogram = Tensor::cat(&planes, 1).view([num_patches, -1]);
        let histogram = l2_normalize(&histogram).clamp(0.0, self.config.clip_val);
        let histogram = l2_normalize(&histogram);

        if self.config.root_sift {
            (l1_normalize(&histogram) + DESCRIPTOR_EPS).sqrt()
        } else {
            histogram
        }
    }
}
