use std::error::Error;
use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::model::constants::*;
use crate::model::error::ConfigError;

/// Settings of the patch descriptor used by the SIFT variants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorConfig {
    pub num_ang_bins: i64,
    pub num_spatial_bins: i64,
    pub clip_val: f64,
    pub root_sift: bool,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        DescriptorConfig {
            num_ang_bins: DEFAULT_NUM_ANG_BINS,
            num_spatial_bins: DEFAULT_NUM_SPATIAL_BINS,
            clip_val: DEFAULT_CLIP_VAL,
            root_sift: false,
        }
    }
}

impl DescriptorConfig {
    /// Length of one descriptor: one histogram of `num_ang_bins` per spatial cell.
    pub const fn descriptor_dim(&self) -> i64 {
        self.num_ang_bins * self.num_spatial_bins * self.num_spatial_bins
    }
}

/// Architecture and optimizer settings. A JSON config must name every field without a
/// `serde(default)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub ret_channels: i64,
    pub vvs_layers: usize,
    /// `[channels, height, width]`
    pub input_shape: [i64; 3],
    pub dropout: f64,
    pub lr: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub patch_size: Option<i64>,
    #[serde(default)]
    pub descriptor: DescriptorConfig,
}

const fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters {
            ret_channels: 32,
            vvs_layers: 2,
            input_shape: [NUM_INPUT_CHANNELS, 32, 32],
            dropout: 0.0,
            lr: 1e-3,
            batch_size: DEFAULT_BATCH_SIZE,
            patch_size: None,
            descriptor: DescriptorConfig::default(),
        }
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidHyperparameter { name, reason: reason.into() }
}

impl Hyperparameters {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn Error>> {
        fs::write(path, bincode::serialize(self)?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        Ok(bincode::deserialize(&fs::read(path)?)?)
    }

    pub const fn height(&self) -> i64 {
        self.input_shape[1]
    }

    pub const fn width(&self) -> i64 {
        self.input_shape[2]
    }

    /// Checks everything that does not depend on the model variant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ret_channels <= 0 {
            return Err(invalid("ret_channels", format!("must be positive, got {}", self.ret_channels)));
        }
        if self.vvs_layers < 1 {
            return Err(invalid("vvs_layers", "at least one VVS layer is required"));
        }

        let [channels, height, width] = self.input_shape;
        if channels != NUM_INPUT_CHANNELS {
            return Err(invalid("input_shape", format!("expected {} input channel, got {}", NUM_INPUT_CHANNELS, channels)));
        }
        if height < KERNEL_SIZE || width < KERNEL_SIZE {
            return Err(invalid("input_shape", format!("spatial size {}x{} is smaller than the {}x{} kernel", height, width, KERNEL_SIZE, KERNEL_SIZE)));
        }

        if !(0.0..1.0).contains(&self.dropout) {
            return Err(invalid("dropout", format!("must lie in [0, 1), got {}", self.dropout)));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(invalid("lr", format!("must be a positive number, got {}", self.lr)));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be positive"));
        }
        if let Some(patch_size) = self.patch_size {
            if patch_size <= 0 {
                return Err(invalid("patch_size", format!("must be positive, got {}", patch_size)));
            }
        }

        let descriptor = &self.descriptor;
        if descriptor.num_ang_bins <= 0 || descriptor.num_spatial_bins <= 0 {
            return Err(invalid("descriptor", "bin counts must be positive"));
        }
        if !(descriptor.clip_val > 0.0) {
            return Err(invalid("descriptor", format!("clip_val must be positive, got {}", descriptor.clip_val)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let hparams = Hyperparameters::default();
        assert!(hparams.validate().is_ok());
        assert_eq!(hparams.descriptor.descriptor_dim(), 128);
    }

    #[test]
    fn test_invalid_values() {
        let cases: Vec<(&str, Hyperparameters)> = vec![
            ("ret_channels", Hyperparameters { ret_channels: 0, ..Default::default() }),
            ("vvs_layers", Hyperparameters { vvs_layers: 0, ..Default::default() }),
            ("input_shape", Hyperparameters { input_shape: [3, 32, 32], ..Default::default() }),
            ("input_shape", Hyperparameters { input_shape: [1, 8, 32], ..Default::default() }),
            ("dropout", Hyperparameters { dropout: 1.0, ..Default::default() }),
            ("dropout", Hyperparameters { dropout: -0.1, ..Default::default() }),
            ("lr", Hyperparameters { lr: 0.0, ..Default::default() }),
            ("lr", Hyperparameters { lr: f64::NAN, ..Default::default() }),
            ("batch_size", Hyperparameters { batch_size: 0, ..Default::default() }),
            ("patch_size", Hyperparameters { patch_size: Some(0), ..Default::default() }),
        ];

        for (expected_name, hparams) in cases {
            match hparams.validate() {
                Err(ConfigError::InvalidHyperparameter { name, .. }) => assert_eq!(name, expected_name),
                other => panic!("Expected {} to be rejected, got {:?}", expected_name, other),
            }
        }
    }

    #[test]
    fn test_json_optional_keys_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hparams.json");
        fs::write(
            &path,
            r#"{"ret_channels": 8, "vvs_layers": 3, "input_shape": [1, 32, 32], "dropout": 0.1, "lr": 0.01, "patch_size": 8}"#,
        ).unwrap();

        let hparams = Hyperparameters::from_json_file(&path).unwrap();
        assert_eq!(hparams.ret_channels, 8);
        assert_eq!(hparams.vvs_layers, 3);
        assert_eq!(hparams.lr, 0.01);
        assert_eq!(hparams.patch_size, Some(8));
        assert_eq!(hparams.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(hparams.descriptor, DescriptorConfig::default());
    }

    #[test]
    fn test_json_missing_required_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hparams.json");
        fs::write(&path, r#"{"ret_channels": 8, "vvs_layers": 3, "input_shape": [1, 32, 32], "dropout": 0.1}"#).unwrap();

        let err = Hyperparameters::from_json_file(&path).unwrap_err();
        assert!(err.to_string().contains("lr"), "{}", err);

        fs::write(&path, r#"{"vvs_layers": 3, "input_shape": [1, 32, 32], "dropout": 0.1, "lr": 0.01}"#).unwrap();
        assert!(Hyperparameters::from_json_file(&path).is_err());
    }

    #[test]
    fn test_binary_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hparams.bin");
        let hparams = Hyperparameters { patch_size: Some(16), dropout: 0.25, ..Default::default() };

        hparams.save(&path).unwrap();
        assert_eq!(Hyperparameters::load(&path).unwrap(), hparams);
    }
}
