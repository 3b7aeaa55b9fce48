use std::error::Error;
use std::path::Path;
use tch::{nn, Device, Tensor};
use crate::hparams::Hyperparameters;
use crate::model::classifier::{Classifier, Mode};
use crate::model::constants::{NUM_CLASSES, NUM_INPUT_CHANNELS};
use crate::model::descriptor::SiftDescriptor;
use crate::model::dimensions::Dimensions;
use crate::model::error::{ConfigError, ShapeError};
use crate::model::fusion_head::{FusionHead, Projection};
use crate::model::retina::RetinaStage;
use crate::model::utils::log_tensor_stats;
use crate::model::variant::{DescriptorVariant, Variant};
use crate::model::vvs::VvsStage;

/// Layers that exist only for some variants.
#[derive(Debug)]
enum Composition {
    Base,
    RetinaStart { sift: SiftDescriptor, sift_fc: Projection },
    VvsEnd { sift: SiftDescriptor },
    Both { sift: SiftDescriptor },
}

/// Retina stage, VVS stage and fusion head, composed according to a `Variant`.
#[derive(Debug)]
pub struct RetinaVvsNet {
    pub vs: nn::VarStore,
    hparams: Hyperparameters,
    variant: Variant,
    dimensions: Dimensions,
    retina: RetinaStage,
    vvs: VvsStage,
    composition: Composition,
    head: FusionHead,
}

impl RetinaVvsNet {
    pub fn new(device: Device, hparams: Hyperparameters, variant: Variant) -> Result<RetinaVvsNet, ConfigError> {
        hparams.validate()?;
        let dimensions = Dimensions::compute(&hparams, variant)?;

        let vs = nn::VarStore::new(device);
        let root = vs.root();

        let retina = RetinaStage::new(&(&root / "retina"), hparams.ret_channels);
        let vvs = VvsStage::new(&(&root / "vvs"), hparams.ret_channels, hparams.vvs_layers);

        let composition = match DescriptorVariant::try_from(variant) {
            Err(_) => Composition::Base,
            Ok(descriptor_variant) => {
                let patch_size = hparams.patch_size.ok_or(ConfigError::MissingPatchSize(variant))?;
                let sift = SiftDescriptor::new(patch_size, hparams.descriptor, device)?;
                let features = dimensions.descriptor_features;
                match descriptor_variant {
                    DescriptorVariant::SiftRetinaStart => Composition::RetinaStart {
                        sift,
                        sift_fc: Projection::new(&root, "sift_fc", features, features, hparams.dropout),
                    },
                    DescriptorVariant::SiftVvsEnd => Composition::VvsEnd { sift },
                    DescriptorVariant::SiftBoth => Composition::Both { sift },
                }
            }
        };

        let head = FusionHead::new(&root, dimensions.fusion_in, hparams.dropout);

        Ok(RetinaVvsNet {
            vs,
            hparams,
            variant,
            dimensions,
            retina,
            vvs,
            composition,
            head,
        })
    }

    pub fn hparams(&self) -> &Hyperparameters {
        &self.hparams
    }

    pub const fn variant(&self) -> Variant {
        self.variant
    }

    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub const fn fusion_in_features(&self) -> i64 {
        self.head.in_features()
    }

    pub fn descriptor_in_features(&self) -> Option<i64> {
        match &self.composition {
            Composition::RetinaStart { sift_fc, .. } => Some(sift_fc.in_features()),
            _ => None,
        }
    }

    pub fn filename(&self) -> &'static str {
        self.variant.filename()
    }

    /// Run identifier built from the architecture-defining hyperparameters.
    pub fn name(&self) -> String {
        let mut name = format!("RetChans{}_VVSLayers{}", self.hparams.ret_channels, self.hparams.vvs_layers);
        if let (true, Some(patch_size)) = (self.variant.uses_descriptors(), self.hparams.patch_size) {
            name += &format!("_PatchSize{}", patch_size);
        }
        name
    }

    /// Save model weights (safetensors when the extension says so)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn Error>> {
        self.vs.save(path)?;
        Ok(())
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), Box<dyn Error>> {
        self.vs.load(path)?;
        Ok(())
    }

    fn check_input(&self, images: &Tensor) -> Result<(), ShapeError> {
        let size = images.size();
        let [_, height, width] = self.hparams.input_shape;
        if size.len() != 4 || size[0] < 1 || size[1..] != [NUM_INPUT_CHANNELS, height, width] {
            return Err(ShapeError::UnexpectedInput { expected: vec![-1, NUM_INPUT_CHANNELS, height, width], actual: size });
        }
        Ok(())
    }

    fn forward_base(&self, images: &Tensor, mode: Mode) -> Result<Tensor, ShapeError> {
        let batch_size = images.size()[0];
        let t = self.retina.forward(images, mode);
        let t = self.vvs.forward(&t, mode);
        self.head.forward(&t.reshape([batch_size, -1]), mode)
    }

    fn forward_retina_start(&self, images: &Tensor, mode: Mode, sift: &SiftDescriptor, sift_fc: &Projection) -> Result<Tensor, ShapeError> {
        let batch_size = images.size()[0];
        let t = self.retina.forward(images, mode);

        // Descriptors of the raw image, projected on their own
        let sift_t = sift.forward(images)?.reshape([batch_size, -1]);
        let sift_t = sift_fc.forward(&sift_t, mode)?;

        let t = self.vvs.forward(&t, mode);
        let t = Tensor::cat(&[t.reshape([batch_size, -1]), sift_t], -1);
        self.head.forward(&t, mode)
    }

    fn forward_vvs_end(&self, images: &Tensor, mode: Mode, sift: &SiftDescriptor) -> Result<Tensor, ShapeError> {
        let batch_size = images.size()[0];
        let t = self.retina.forward(images, mode);
        let t = self.vvs.forward(&t, mode);
        let t = sift.forward(&t)?.reshape([batch_size, -1]);
        self.head.forward(&t, mode)
    }

    fn forward_both(&self, images: &Tensor, mode: Mode, sift: &SiftDescriptor) -> Result<Tensor, ShapeError> {
        let batch_size = images.size()[0];
        let t = self.retina.forward(images, mode);
        let st = sift.forward(&t)?;

        let t = self.vvs.forward(&t, mode);
        let t = sift.forward(&t)?.reshape([batch_size, -1]);
        let t = Tensor::cat(&[t, st.reshape([batch_size, -1])], -1);
        self.head.forward(&t, mode)
    }
}

impl Classifier for RetinaVvsNet {
    fn forward_t(&self, images: &Tensor, mode: Mode) -> Result<Tensor, ShapeError> {
        self.check_input(images)?;

        let logits = match &self.composition {
            Composition::Base => self.forward_base(images, mode)?,
            Composition::RetinaStart { sift, sift_fc } => self.forward_retina_start(images, mode, sift, sift_fc)?,
            Composition::VvsEnd { sift } => self.forward_vvs_end(images, mode, sift)?,
            Composition::Both { sift } => self.forward_both(images, mode, sift)?,
        };

        log_tensor_stats(&logits, "logits");
        assert_eq!(logits.size(), [images.size()[0], NUM_CLASSES]);
        Ok(logits)
    }
}

#[cfg(test)]
mod tests {
    use tch::nn::OptimizerConfig;
    use tch::Kind;
    use crate::model::constants::NUM_VVS_CHANNELS;
    use crate::model::utils::{seed_everything, DEVICE};
    use super::*;

    fn small_hparams(patch_size: Option<i64>) -> Hyperparameters {
        Hyperparameters {
            ret_channels: 4,
            vvs_layers: 1,
            input_shape: [1, 16, 16],
            patch_size,
            ..Default::default()
        }
    }

    fn images(batch_size: i64, size: i64) -> Tensor {
        Tensor::rand(&[batch_size, 1, size, size], (Kind::Float, *DEVICE))
    }

    #[test]
    fn test_end_to_end_base() {
        seed_everything(42);
        let hparams = Hyperparameters {
            ret_channels: 32,
            vvs_layers: 2,
            input_shape: [1, 32, 32],
            dropout: 0.0,
            lr: 1e-3,
            ..Default::default()
        };
        let model = RetinaVvsNet::new(*DEVICE, hparams, Variant::Base).unwrap();
        assert_eq!(model.fusion_in_features(), 32 * 32 * 32);

        let logits = model.forward_t(&images(4, 32), Mode::Train).unwrap();
        assert_eq!(logits.size(), [4, 10]);
    }

    #[test]
    fn test_all_variants_produce_logits() {
        for variant in Variant::iter() {
            let model = RetinaVvsNet::new(*DEVICE, small_hparams(Some(8)), variant).unwrap();
            for mode in [Mode::Train, Mode::Eval] {
                let logits = model.forward_t(&images(2, 16), mode).unwrap();
                assert_eq!(logits.size(), [2, NUM_CLASSES], "{} in {:?}", variant, mode);
            }
        }
    }

    #[test]
    fn test_batch_of_one() {
        for variant in Variant::iter() {
            let model = RetinaVvsNet::new(*DEVICE, small_hparams(Some(8)), variant).unwrap();
            let logits = model.forward_t(&images(1, 16), Mode::Eval).unwrap();
            assert_eq!(logits.size(), [1, NUM_CLASSES]);
        }
    }

    #[test]
    fn test_projection_widths_match_dimensions() {
        let hparams = small_hparams(Some(8));
        let grid = 4;
        let dim = 128;

        let base = RetinaVvsNet::new(*DEVICE, hparams.clone(), Variant::Base).unwrap();
        assert_eq!(base.fusion_in_features(), NUM_VVS_CHANNELS * 16 * 16);
        assert_eq!(base.descriptor_in_features(), None);

        let start = RetinaVvsNet::new(*DEVICE, hparams.clone(), Variant::SiftRetinaStart).unwrap();
        assert_eq!(start.descriptor_in_features(), Some(grid * dim));
        assert_eq!(start.fusion_in_features(), NUM_VVS_CHANNELS * 16 * 16 + grid * dim);

        let end = RetinaVvsNet::new(*DEVICE, hparams.clone(), Variant::SiftVvsEnd).unwrap();
        assert_eq!(end.fusion_in_features(), NUM_VVS_CHANNELS * grid * dim);

        let both = RetinaVvsNet::new(*DEVICE, hparams.clone(), Variant::SiftBoth).unwrap();
        assert_eq!(both.fusion_in_features(), (NUM_VVS_CHANNELS + 4) * grid * dim);

        for model in [&base, &start, &end, &both] {
            assert_eq!(model.fusion_in_features(), model.dimensions().fusion_in);
        }
    }

    #[test]
    fn test_both_ends_consumes_retina_descriptors() {
        seed_everything(3);
        let model = RetinaVvsNet::new(*DEVICE, small_hparams(Some(8)), Variant::SiftBoth).unwrap();
        let sift = match &model.composition {
            Composition::Both { sift } => sift,
            other => panic!("Unexpected composition {:?}", other),
        };
        let x = images(2, 16);

        let t = model.retina.forward(&x, Mode::Eval);
        let st = sift.forward(&t).unwrap().reshape([2, -1]);
        let t = model.vvs.forward(&t, Mode::Eval);
        let vvs_descriptors = sift.forward(&t).unwrap().reshape([2, -1]);

        // The fusion input is exactly the VVS descriptors followed by the retina descriptors
        assert_eq!(
            model.fusion_in_features(),
            vvs_descriptors.size()[1] + st.size()[1]
        );
        let expected = model.head.forward(&Tensor::cat(&[vvs_descriptors, st], -1), Mode::Eval).unwrap();
        let logits = model.forward_t(&x, Mode::Eval).unwrap();
        assert!(logits.allclose(&expected, 1e-5, 1e-6, false));
    }

    #[test]
    fn test_indivisible_patch_size_fails_at_construction() {
        for variant in Variant::iter().filter(|v| v.uses_descriptors()) {
            let result = RetinaVvsNet::new(*DEVICE, small_hparams(Some(6)), variant);
            assert_eq!(
                result.unwrap_err(),
                ConfigError::IndivisiblePatchSize { patch_size: 6, height: 16, width: 16 }
            );
        }
        assert!(RetinaVvsNet::new(*DEVICE, small_hparams(Some(6)), Variant::Base).is_ok());
    }

    #[test]
    fn test_wrong_input_shape_is_rejected() {
        let model = RetinaVvsNet::new(*DEVICE, small_hparams(None), Variant::Base).unwrap();

        let wrong_size = images(2, 20);
        assert!(matches!(model.forward_t(&wrong_size, Mode::Eval), Err(ShapeError::UnexpectedInput { .. })));

        let rgb = Tensor::rand(&[2, 3, 16, 16], (Kind::Float, *DEVICE));
        assert!(matches!(model.forward_t(&rgb, Mode::Eval), Err(ShapeError::UnexpectedInput { .. })));
    }

    #[test]
    fn test_eval_is_deterministic() {
        seed_everything(42);
        let model = RetinaVvsNet::new(*DEVICE, small_hparams(Some(8)), Variant::SiftRetinaStart).unwrap();
        let x = images(3, 16);

        let first = model.forward_t(&x, Mode::Eval).unwrap();
        let second = model.forward_t(&x, Mode::Eval).unwrap();
        assert!(first.equal(&second));

        seed_everything(42);
        let twin = RetinaVvsNet::new(*DEVICE, small_hparams(Some(8)), Variant::SiftRetinaStart).unwrap();
        assert!(twin.forward_t(&x, Mode::Eval).unwrap().equal(&first));
    }

    #[test]
    fn test_names() {
        let base = RetinaVvsNet::new(*DEVICE, small_hparams(Some(8)), Variant::Base).unwrap();
        assert_eq!(base.filename(), "RetinaVVS");
        assert_eq!(base.name(), "RetChans4_VVSLayers1");

        let end = RetinaVvsNet::new(*DEVICE, small_hparams(Some(8)), Variant::SiftVvsEnd).unwrap();
        assert_eq!(end.filename(), "SIFTVVSEnd");
        assert_eq!(end.name(), "RetChans4_VVSLayers1_PatchSize8");
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.safetensors");

        let model = RetinaVvsNet::new(*DEVICE, small_hparams(Some(8)), Variant::SiftBoth).unwrap();
        model.save(&path).unwrap();

        let mut restored = RetinaVvsNet::new(*DEVICE, small_hparams(Some(8)), Variant::SiftBoth).unwrap();
        restored.load(&path).unwrap();

        let x = images(2, 16);
        let a = model.forward_t(&x, Mode::Eval).unwrap();
        let b = restored.forward_t(&x, Mode::Eval).unwrap();
        assert!(a.allclose(&b, 1e-6, 1e-6, false));
    }

    #[test]
    fn test_optimizer_updates_parameters() {
        let model = RetinaVvsNet::new(*DEVICE, small_hparams(None), Variant::Base).unwrap();
        let mut optimizer = nn::Adam::default().build(&model.vs, 1e-3).unwrap();

        let before = model.forward_t(&images(1, 16).ones_like(), Mode::Eval).unwrap();
        let logits = model.forward_t(&images(4, 16), Mode::Train).unwrap();
        let labels = Tensor::from_slice(&[0i64, 1, 2, 3]).to_device(*DEVICE);
        optimizer.backward_step(&logits.cross_entropy_for_logits(&labels));

        let after = model.forward_t(&images(1, 16).ones_like(), Mode::Eval).unwrap();
        assert!(!before.equal(&after));
    }
}
