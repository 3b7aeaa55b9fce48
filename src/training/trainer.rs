use indexmap::IndexMap;
use tch::nn::{self, OptimizerConfig};
use tracing::{debug, info, warn};
use crate::data::ImageDataset;
use crate::model::RetinaVvsNet;
use crate::training::callbacks::{Callback, Signal};
use crate::training::error::{MetricError, TrainError};
use crate::training::logger::MetricsLogger;
use crate::training::metrics::{EpochAccumulator, EpochAggregate};
use crate::training::step::run_step;

/// How a call to [`Trainer::fit`] ended.
#[derive(Debug, Clone, PartialEq)]
pub struct FitSummary {
    pub epochs_run: usize,
    pub stopped_early: bool,
    /// Everything logged during the last epoch, in logging order.
    pub last_metrics: IndexMap<String, f64>,
}

/// Runs train and validation epochs, logging aggregates and consulting callbacks after each.
pub struct Trainer {
    max_epochs: usize,
    fast_dev_run: bool,
    seed: u64,
    callbacks: Vec<Box<dyn Callback>>,
}

impl Trainer {
    pub fn new(max_epochs: usize) -> Trainer {
        Trainer { max_epochs, fast_dev_run: false, seed: 0, callbacks: Vec::new() }
    }

    /// One epoch over a single random batch of each split.
    pub fn fast_dev_run(mut self, enabled: bool) -> Trainer {
        self.fast_dev_run = enabled;
        self
    }

    /// Seeds the sample drawn for a fast dev run.
    pub fn seed(mut self, seed: u64) -> Trainer {
        self.seed = seed;
        self
    }

    pub fn with_callback(mut self, callback: Box<dyn Callback>) -> Trainer {
        self.callbacks.push(callback);
        self
    }

    pub fn fit(
        &mut self,
        model: &RetinaVvsNet,
        train: &ImageDataset,
        val: &ImageDataset,
        logger: &mut dyn MetricsLogger,
    ) -> Result<FitSummary, TrainError> {
        let batch_size = model.hparams().batch_size;
        let mut optimizer = nn::Adam::default().build(&model.vs, model.hparams().lr)?;

        let sampled;
        let (train, val, max_epochs) = if self.fast_dev_run {
            let mut rng = fastrand::Rng::with_seed(self.seed);
            sampled = (train.sample(batch_size, &mut rng), val.sample(batch_size, &mut rng));
            (&sampled.0, &sampled.1, 1)
        } else {
            (train, val, self.max_epochs)
        };

        info!(
            model = %model.name(),
            variant = %model.variant(),
            train = train.len(),
            val = val.len(),
            max_epochs,
            "starting training"
        );

        let mut summary = FitSummary { epochs_run: 0, stopped_early: false, last_metrics: IndexMap::new() };
        for epoch in 0..max_epochs {
            let mut metrics = IndexMap::new();
            let mut record = |name: &str, value: f64, prog_bar: bool| {
                logger.log_metric(name, value, epoch, prog_bar);
                metrics.insert(name.to_string(), value);
            };

            let train_agg = run_epoch(model, Some(&mut optimizer), train, batch_size, epoch)?;
            record("train_loss", train_agg.loss, false);
            record("train_acc", train_agg.accuracy, false);
            record("epoch_duration", train_agg.duration.as_secs_f64(), false);
            record("step", epoch as f64, false);
            record_auc(&mut record, "train_auc", train_agg.auc, false, epoch);

            let val_agg = run_epoch(model, None, val, batch_size, epoch)?;
            record("val_loss", val_agg.loss, true);
            record("val_acc", val_agg.accuracy, true);
            record_auc(&mut record, "val_auc", val_agg.auc, true, epoch);

            info!(
                epoch,
                train_loss = train_agg.loss,
                train_acc = train_agg.accuracy,
                val_loss = val_agg.loss,
                val_acc = val_agg.accuracy,
                "epoch finished"
            );

            let mut stop = false;
            for callback in self.callbacks.iter_mut() {
                if callback.on_validation_end(epoch, &metrics, model)? == Signal::Stop {
                    stop = true;
                }
            }

            summary.epochs_run = epoch + 1;
            summary.last_metrics = metrics;
            if stop {
                summary.stopped_early = true;
                break;
            }
        }
        Ok(summary)
    }
}

fn record_auc(
    record: &mut impl FnMut(&str, f64, bool),
    name: &str,
    auc: Option<Result<f64, MetricError>>,
    prog_bar: bool,
    epoch: usize,
) {
    match auc {
        Some(Ok(value)) => record(name, value, prog_bar),
        Some(Err(err)) => warn!(epoch, metric = name, %err, "skipping ROC-AUC"),
        None => {}
    }
}

/// Train when given an optimizer, validate otherwise.
fn run_epoch(
    model: &RetinaVvsNet,
    mut optimizer: Option<&mut nn::Optimizer>,
    data: &ImageDataset,
    batch_size: usize,
    epoch: usize,
) -> Result<EpochAggregate, TrainError> {
    let shuffle = optimizer.is_some();
    let mut accumulator = EpochAccumulator::for_epoch(epoch);
    for (i, batch) in data.batches(batch_size, shuffle, model.vs.device()).enumerate() {
        let output = run_step(model, optimizer.as_deref_mut(), &batch)?;
        debug!(epoch, batch = i, train = shuffle, loss = output.loss, accuracy = output.accuracy);
        accumulator.push(&output)?;
    }
    Ok(accumulator.finish()?)
}
