// Convolution geometry shared by the Retina and VVS stages
pub const KERNEL_SIZE: i64 = 9; // 9x9 kernels everywhere
pub const PADDING: i64 = (KERNEL_SIZE - 1) / 2; // 4, restores the spatial size lost by an unpadded conv

pub const NUM_INPUT_CHANNELS: i64 = 1; // single-channel (grayscale) images
pub const NUM_RETINA_HIDDEN_CHANNELS: i64 = 32; // output of the first retina conv
pub const NUM_VVS_CHANNELS: i64 = 32; // every VVS block outputs 32 feature maps

pub const NUM_EMBEDDING_FEATURES: i64 = 1024; // width of the fusion projection
pub const NUM_CLASSES: i64 = 10; // CIFAR-10

pub const DEFAULT_BATCH_SIZE: usize = 32;

// Descriptor defaults
pub const DEFAULT_NUM_ANG_BINS: i64 = 8;
pub const DEFAULT_NUM_SPATIAL_BINS: i64 = 4;
pub const DEFAULT_CLIP_VAL: f64 = 0.2;
pub const DESCRIPTOR_EPS: f64 = 1e-10;
pub const NORMALIZE_EPS: f64 = 1e-12;
