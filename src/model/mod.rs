pub mod constants;
pub mod utils;
pub mod error;
pub mod descriptor;
pub mod retina;
pub mod vvs;
pub mod fusion_head;
pub mod dimensions;
pub mod variant;
pub mod classifier;
pub mod retina_vvs_net;

pub use classifier::{Classifier, Mode};
pub use error::{ConfigError, ShapeError};
pub use retina_vvs_net::RetinaVvsNet;
pub use variant::{DescriptorVariant, Variant};
