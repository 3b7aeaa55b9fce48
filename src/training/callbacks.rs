use std::fs;
use std::path::{Path, PathBuf};
use indexmap::IndexMap;
use tracing::info;
use crate::model::RetinaVvsNet;
use crate::training::error::TrainError;

pub const WEIGHTS_FILE: &str = "weights.safetensors";
pub const HPARAMS_FILE: &str = "hparams.bin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    Min,
    Max,
}

impl MonitorMode {
    /// Whether `current` beats `best`; NaN never does.
    pub fn improves(self, current: f64, best: Option<f64>) -> bool {
        if current.is_nan() {
            return false;
        }
        match (self, best) {
            (_, None) => true,
            (MonitorMode::Min, Some(best)) => current < best,
            (MonitorMode::Max, Some(best)) => current > best,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Continue,
    Stop,
}

/// Hook run after every validation aggregate has been logged.
pub trait Callback {
    fn on_validation_end(
        &mut self,
        epoch: usize,
        metrics: &IndexMap<String, f64>,
        model: &RetinaVvsNet,
    ) -> Result<Signal, TrainError>;
}

fn monitored(metrics: &IndexMap<String, f64>, monitor: &str) -> Result<f64, TrainError> {
    metrics
        .get(monitor)
        .copied()
        .ok_or_else(|| TrainError::MissingMetric(monitor.to_string()))
}

/// Stops training once `monitor` has not improved for `patience` consecutive epochs.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    monitor: String,
    mode: MonitorMode,
    patience: usize,
    best: Option<f64>,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(monitor: impl Into<String>, mode: MonitorMode, patience: usize) -> EarlyStopping {
        EarlyStopping { monitor: monitor.into(), mode, patience, best: None, wait: 0 }
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }
}

impl Callback for EarlyStopping {
    fn on_validation_end(
        &mut self,
        epoch: usize,
        metrics: &IndexMap<String, f64>,
        _model: &RetinaVvsNet,
    ) -> Result<Signal, TrainError> {
        let current = monitored(metrics, &self.monitor)?;
        if self.mode.improves(current, self.best) {
            self.best = Some(current);
            self.wait = 0;
            return Ok(Signal::Continue);
        }

        self.wait += 1;
        if self.wait >= self.patience {
            info!(epoch, monitor = %self.monitor, best = ?self.best, patience = self.patience, "early stopping");
            return Ok(Signal::Stop);
        }
        Ok(Signal::Continue)
    }
}

/// Keeps the weights (and the hyperparameters to rebuild them) of the best epoch so far.
#[derive(Debug, Clone)]
pub struct ModelCheckpoint {
    dirpath: PathBuf,
    monitor: String,
    mode: MonitorMode,
    best: Option<f64>,
    best_epoch: Option<usize>,
}

impl ModelCheckpoint {
    pub fn new(dirpath: impl Into<PathBuf>, monitor: impl Into<String>, mode: MonitorMode) -> ModelCheckpoint {
        ModelCheckpoint { dirpath: dirpath.into(), monitor: monitor.into(), mode, best: None, best_epoch: None }
    }

    pub fn dirpath(&self) -> &Path {
        &self.dirpath
    }

    pub fn weights_path(&self) -> PathBuf {
        self.dirpath.join(WEIGHTS_FILE)
    }

    pub fn hparams_path(&self) -> PathBuf {
        self.dirpath.join(HPARAMS_FILE)
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }
}

impl Callback for ModelCheckpoint {
    fn on_validation_end(
        &mut self,
        epoch: usize,
        metrics: &IndexMap<String, f64>,
        model: &RetinaVvsNet,
    ) -> Result<Signal, TrainError> {
        let current = monitored(metrics, &self.monitor)?;
        if !self.mode.improves(current, self.best) {
            return Ok(Signal::Continue);
        }

        fs::create_dir_all(&self.dirpath)?;
        model
            .save(self.weights_path())
            .map_err(|e| TrainError::Checkpoint(e.to_string()))?;
        model
            .hparams()
            .save(self.hparams_path())
            .map_err(|e| TrainError::Checkpoint(e.to_string()))?;

        self.best = Some(current);
        self.best_epoch = Some(epoch);
        info!(epoch, monitor = %self.monitor, value = current, path = %self.weights_path().display(), "saved checkpoint");
        Ok(Signal::Continue)
    }
}
