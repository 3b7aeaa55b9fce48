use tch::{nn, Tensor};
use crate::model::classifier::Mode;
use crate::model::constants::{KERNEL_SIZE, NUM_INPUT_CHANNELS, NUM_RETINA_HIDDEN_CHANNELS, PADDING};

/// Convolution, ReLU, batch norm, then zero padding back to the input size.
///
/// Shared by the Retina and VVS stages.
#[derive(Debug)]
pub struct ConvBlock {
    conv: nn::Conv2D,
    bn: nn::BatchNorm,
}

impl ConvBlock {
    pub fn new(vs: &nn::Path, in_channels: i64, out_channels: i64) -> ConvBlock {
        // Unpadded, the pad after batch norm restores the size
        let conv = nn::conv2d(vs / "conv", in_channels, out_channels, KERNEL_SIZE, Default::default());
        let bn = nn::batch_norm2d(vs / "bn", out_channels, Default::default());
        ConvBlock { conv, bn }
    }

    pub fn forward(&self, x: &Tensor, mode: Mode) -> Tensor {
        x.apply(&self.conv)
            .relu()
            .apply_t(&self.bn, mode.is_train())
            .zero_pad2d(PADDING, PADDING, PADDING, PADDING)
    }
}

/// Two-block front end: 1 -> 32 -> `ret_channels` feature maps at the input resolution.
#[derive(Debug)]
pub struct RetinaStage {
    input_block: ConvBlock,
    output_block: ConvBlock,
    out_channels: i64,
}

impl RetinaStage {
    pub fn new(vs: &nn::Path, ret_channels: i64) -> RetinaStage {
        RetinaStage {
            input_block: ConvBlock::new(&(vs / "input"), NUM_INPUT_CHANNELS, NUM_RETINA_HIDDEN_CHANNELS),
            output_block: ConvBlock::new(&(vs / "output"), NUM_RETINA_HIDDEN_CHANNELS, ret_channels),
            out_channels: ret_channels,
        }
    }

    pub const fn out_channels(&self) -> i64 {
        self.out_channels
    }

    pub fn forward(&self, x: &Tensor, mode: Mode) -> Tensor {
        let x = self.input_block.forward(x, mode);
        self.output_block.forward(&x, mode)
    }
}

#[cfg(test)]
mod tests {
    use tch::Kind;
    use crate::model::utils::DEVICE;
    use super::*;

    #[test]
    fn test_retina_preserves_spatial_size() {
        let vs = nn::VarStore::new(*DEVICE);
        let retina = RetinaStage::new(&vs.root(), 16);

        for (height, width) in [(9, 9), (32, 32), (20, 12)] {
            let x = Tensor::rand(&[2, 1, height, width], (Kind::Float, *DEVICE));
            let y = retina.forward(&x, Mode::Train);
            assert_eq!(y.size(), [2, 16, height, width]);
        }
    }

    #[test]
    fn test_padding_is_zero() {
        let vs = nn::VarStore::new(*DEVICE);
        let block = ConvBlock::new(&vs.root(), 1, 4);

        let x = Tensor::rand(&[1, 1, 12, 12], (Kind::Float, *DEVICE));
        let y = block.forward(&x, Mode::Eval);

        assert_eq!(y.size(), [1, 4, 12, 12]);
        let border = y.narrow(2, 0, PADDING);
        assert_eq!(border.abs().sum(Kind::Float).double_value(&[]), 0.0);
    }

    #[test]
    fn test_eval_mode_keeps_running_stats() {
        let vs = nn::VarStore::new(*DEVICE);
        let retina = RetinaStage::new(&vs.root(), 4);
        let x = Tensor::rand(&[3, 1, 16, 16], (Kind::Float, *DEVICE));

        let before: Vec<(String, Tensor)> = vs.variables().into_iter().map(|(k, t)| (k, t.copy())).collect();
        let first = retina.forward(&x, Mode::Eval);
        let second = retina.forward(&x, Mode::Eval);
        assert!(first.equal(&second));

        let after = vs.variables();
        for (name, tensor) in before {
            assert!(tensor.equal(&after[&name]), "{} changed in eval mode", name);
        }
    }
}
