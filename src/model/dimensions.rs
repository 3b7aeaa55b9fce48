use crate::hparams::Hyperparameters;
use crate::model::constants::{NUM_VVS_CHANNELS, NUM_INPUT_CHANNELS};
use crate::model::error::ConfigError;
use crate::model::variant::{DescriptorVariant, Variant};

/// Feature widths of every projection, derived from the configuration alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    /// Width of the flattened VVS output, `32 * H * W`.
    pub vvs_features: i64,
    /// Width of one image's flattened raw-image descriptors, zero unless `SiftRetinaStart`.
    pub descriptor_features: i64,
    /// Input width of the 1024-wide fusion projection.
    pub fusion_in: i64,
}

/// Number of patches per image, failing when the patch grid does not tile the image.
pub fn patch_grid(patch_size: i64, height: i64, width: i64) -> Result<i64, ConfigError> {
    if patch_size <= 0 || height % patch_size != 0 || width % patch_size != 0 {
        return Err(ConfigError::IndivisiblePatchSize { patch_size, height, width });
    }
    Ok((height / patch_size) * (width / patch_size))
}

impl Dimensions {
    pub fn compute(hparams: &Hyperparameters, variant: Variant) -> Result<Dimensions, ConfigError> {
        let (height, width) = (hparams.height(), hparams.width());
        let vvs_features = NUM_VVS_CHANNELS * height * width;

        let descriptor_variant = match DescriptorVariant::try_from(variant) {
            Ok(descriptor_variant) => descriptor_variant,
            Err(_) => {
                return Ok(Dimensions { vvs_features, descriptor_features: 0, fusion_in: vvs_features });
            }
        };

        let patch_size = hparams.patch_size.ok_or(ConfigError::MissingPatchSize(variant))?;
        let per_channel = patch_grid(patch_size, height, width)? * hparams.descriptor.descriptor_dim();

        let dimensions = match descriptor_variant {
            DescriptorVariant::SiftRetinaStart => {
                let descriptor_features = NUM_INPUT_CHANNELS * per_channel;
                Dimensions {
                    vvs_features,
                    descriptor_features,
                    fusion_in: vvs_features + descriptor_features,
                }
            }
            DescriptorVariant::SiftVvsEnd => Dimensions {
                vvs_features,
                descriptor_features: 0,
                fusion_in: NUM_VVS_CHANNELS * per_channel,
            },
            // VVS-output descriptors followed by Retina-output descriptors
            DescriptorVariant::SiftBoth => Dimensions {
                vvs_features,
                descriptor_features: 0,
                fusion_in: (NUM_VVS_CHANNELS + hparams.ret_channels) * per_channel,
            },
        };

        Ok(dimensions)
    }
}
