use std::path::PathBuf;
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tch::Device;
use tracing::info;
use tracing_subscriber::EnvFilter;
use retina_vvs::data::cifar;
use retina_vvs::hparams::Hyperparameters;
use retina_vvs::model::utils::{seed_everything, DEVICE};
use retina_vvs::model::{RetinaVvsNet, Variant};
use retina_vvs::training::callbacks::{EarlyStopping, ModelCheckpoint, MonitorMode};
use retina_vvs::training::logger::{FanOutLogger, MemoryLogger, TracingLogger};
use retina_vvs::training::Trainer;

const VAL_FRACTION: f64 = 0.2;

/// Train a Retina-VVS classifier on grayscale CIFAR-10
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// retina-vvs, sift-retina-start, sift-vvs-end or sift-both
    #[arg(long, default_value = "retina-vvs")]
    model: Variant,

    /// Directory holding the CIFAR-10 binary batches
    #[arg(long, default_value = "data/cifar-10-batches-bin")]
    data_dir: PathBuf,

    /// JSON file with hyperparameters; only batch_size, patch_size and descriptor may be omitted
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    ret_channels: Option<i64>,

    #[arg(long)]
    vvs_layers: Option<usize>,

    #[arg(long)]
    patch_size: Option<i64>,

    #[arg(long)]
    dropout: Option<f64>,

    #[arg(long)]
    lr: Option<f64>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long, default_value_t = 100)]
    max_epochs: usize,

    /// Epochs without a lower validation loss before stopping
    #[arg(long, default_value_t = 3)]
    es_patience: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Run one batch of training and validation, then exit
    #[arg(long)]
    fast_dev_run: bool,

    #[arg(long)]
    cpu: bool,

    /// Best checkpoints go to `<out-dir>/<model file name>/`
    #[arg(long, default_value = "Best_Models")]
    out_dir: PathBuf,

    /// Dump the full metric history here once training ends
    #[arg(long)]
    metrics_json: Option<PathBuf>,
}

impl Args {
    fn hyperparameters(&self) -> Result<Hyperparameters> {
        let mut hparams = match &self.config {
            Some(path) => Hyperparameters::from_json_file(path)
                .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?,
            None => Hyperparameters::default(),
        };
        if let Some(ret_channels) = self.ret_channels {
            hparams.ret_channels = ret_channels;
        }
        if let Some(vvs_layers) = self.vvs_layers {
            hparams.vvs_layers = vvs_layers;
        }
        if self.patch_size.is_some() {
            hparams.patch_size = self.patch_size;
        }
        if let Some(dropout) = self.dropout {
            hparams.dropout = dropout;
        }
        if let Some(lr) = self.lr {
            hparams.lr = lr;
        }
        if let Some(batch_size) = self.batch_size {
            hparams.batch_size = batch_size;
        }
        Ok(hparams)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut hparams = args.hyperparameters()?;
    seed_everything(args.seed);

    let (full_train, _test) = cifar::load_grayscale(&args.data_dir)
        .with_context(|| format!("Failed to load CIFAR-10 from {}", args.data_dir.display()))?;
    let (train, val) = full_train.random_split(VAL_FRACTION, args.seed);
    hparams.input_shape = train.image_shape();

    let device = if args.cpu { Device::Cpu } else { *DEVICE };
    let model = RetinaVvsNet::new(device, hparams, args.model)?;
    info!(
        model = %model.name(),
        variant = %model.variant(),
        fusion_in = model.fusion_in_features(),
        device = ?device,
        "built model"
    );

    let checkpoint_dir = args.out_dir.join(model.filename());
    let mut trainer = Trainer::new(args.max_epochs)
        .fast_dev_run(args.fast_dev_run)
        .seed(args.seed)
        .with_callback(Box::new(EarlyStopping::new("val_loss", MonitorMode::Min, args.es_patience)))
        .with_callback(Box::new(ModelCheckpoint::new(&checkpoint_dir, "val_acc", MonitorMode::Max)));

    let mut tracing_logger = TracingLogger::new(model.name());
    let mut memory_logger = MemoryLogger::new();
    let summary = {
        let mut logger = FanOutLogger::new(vec![&mut tracing_logger, &mut memory_logger]);
        trainer.fit(&model, &train, &val, &mut logger)?
    };
    info!(
        epochs = summary.epochs_run,
        stopped_early = summary.stopped_early,
        checkpoint = %checkpoint_dir.display(),
        "training finished"
    );

    if let Some(path) = &args.metrics_json {
        memory_logger
            .save_json(path)
            .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))?;
    }
    Ok(())
}
