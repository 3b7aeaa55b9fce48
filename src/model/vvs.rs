use tch::{nn, Tensor};
use crate::model::classifier::Mode;
use crate::model::constants::NUM_VVS_CHANNELS;
use crate::model::retina::ConvBlock;

/// Configurable-depth stack refining the Retina output into 32 feature maps.
#[derive(Debug)]
pub struct VvsStage {
    blocks: Vec<ConvBlock>,
}

impl VvsStage {
    pub fn new(vs: &nn::Path, ret_channels: i64, num_layers: usize) -> VvsStage {
        let mut blocks = Vec::with_capacity(num_layers);
        for i in 0..num_layers {
            let in_channels = if i == 0 { ret_channels } else { NUM_VVS_CHANNELS };
            blocks.push(ConvBlock::new(&(vs / i), in_channels, NUM_VVS_CHANNELS));
        }
        VvsStage { blocks }
    }

    pub fn num_layers(&self) -> usize {
        self.blocks.len()
    }

    pub fn forward(&self, x: &Tensor, mode: Mode) -> Tensor {
        let mut x = x.shallow_clone();
        for block in &self.blocks {
            x = block.forward(&x, mode);
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use tch::Kind;
    use crate::model::utils::DEVICE;
    use super::*;

    #[test]
    fn test_vvs_preserves_spatial_size() {
        for num_layers in 1..=3 {
            let vs = nn::VarStore::new(*DEVICE);
            let vvs = VvsStage::new(&vs.root(), 5, num_layers);
            assert_eq!(vvs.num_layers(), num_layers);

            let x = Tensor::rand(&[2, 5, 14, 10], (Kind::Float, *DEVICE));
            let y = vvs.forward(&x, Mode::Train);
            assert_eq!(y.size(), [2, NUM_VVS_CHANNELS, 14, 10]);
        }
    }

    #[test]
    fn test_vvs_parameter_count() {
        let vs = nn::VarStore::new(*DEVICE);
        let _vvs = VvsStage::new(&vs.root(), 8, 2);

        // conv weights + biases, batch norm affine params
        let conv0 = 32 * 8 * 9 * 9 + 32;
        let conv1 = 32 * 32 * 9 * 9 + 32;
        let bn = 2 * 32;
        let trainable: i64 = vs.trainable_variables().iter().map(|t| t.numel() as i64).sum();
        assert_eq!(trainable, conv0 + conv1 + 2 * bn);
    }
}
