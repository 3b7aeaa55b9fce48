use std::error::Error;
use std::fs;
use std::path::Path;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::info;

/// Sink for per-epoch scalar metrics.
pub trait MetricsLogger {
    /// `prog_bar` marks metrics meant for progress display.
    fn log_metric(&mut self, name: &str, value: f64, epoch: usize, prog_bar: bool);
}

/// Emits every metric as a `tracing` event.
#[derive(Debug, Clone)]
pub struct TracingLogger {
    run_name: String,
}

impl TracingLogger {
    pub fn new(run_name: impl Into<String>) -> TracingLogger {
        TracingLogger { run_name: run_name.into() }
    }
}

impl MetricsLogger for TracingLogger {
    fn log_metric(&mut self, name: &str, value: f64, epoch: usize, prog_bar: bool) {
        info!(run = %self.run_name, epoch, metric = name, value, prog_bar);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricPoint {
    pub epoch: usize,
    pub value: f64,
}

/// Keeps the full history of every metric, in first-logged order.
#[derive(Debug, Default, Clone, Serialize)]
pub struct MemoryLogger {
    history: IndexMap<String, Vec<MetricPoint>>,
}

impl MemoryLogger {
    pub fn new() -> MemoryLogger {
        MemoryLogger::default()
    }

    pub fn history(&self) -> &IndexMap<String, Vec<MetricPoint>> {
        &self.history
    }

    pub fn values(&self, name: &str) -> Vec<f64> {
        self.history
            .get(name)
            .map(|points| points.iter().map(|p| p.value).collect())
            .unwrap_or_default()
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn Error>> {
        fs::write(path, serde_json::to_string_pretty(&self.history)?)?;
        Ok(())
    }
}

impl MetricsLogger for MemoryLogger {
    fn log_metric(&mut self, name: &str, value: f64, epoch: usize, _prog_bar: bool) {
        self.history
            .entry(name.to_string())
            .or_default()
            .push(MetricPoint { epoch, value });
    }
}

/// Forwards every metric to several loggers.
#[derive(Default)]
pub struct FanOutLogger<'a> {
    loggers: Vec<&'a mut dyn MetricsLogger>,
}

impl<'a> FanOutLogger<'a> {
    pub fn new(loggers: Vec<&'a mut dyn MetricsLogger>) -> FanOutLogger<'a> {
        FanOutLogger { loggers }
    }
}

impl MetricsLogger for FanOutLogger<'_> {
    fn log_metric(&mut self, name: &str, value: f64, epoch: usize, prog_bar: bool) {
        for logger in self.loggers.iter_mut() {
            logger.log_metric(name, value, epoch, prog_bar);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_logger_history() {
        let mut logger = MemoryLogger::new();
        logger.log_metric("train_loss", 2.0, 0, false);
        logger.log_metric("train_acc", 0.1, 0, false);
        logger.log_metric("train_loss", 1.5, 1, false);

        assert_eq!(logger.values("train_loss"), vec![2.0, 1.5]);
        assert_eq!(logger.values("val_loss"), Vec::<f64>::new());
        assert_eq!(logger.history().keys().collect::<Vec<_>>(), vec!["train_loss", "train_acc"]);
    }

    #[test]
    fn test_fan_out_and_json_dump() {
        let mut memory = MemoryLogger::new();
        let mut tracing_logger = TracingLogger::new("run");
        {
            let mut fan_out = FanOutLogger::new(vec![&mut memory, &mut tracing_logger]);
            fan_out.log_metric("val_acc", 0.5, 3, true);
        }
        assert_eq!(memory.values("val_acc"), vec![0.5]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        memory.save_json(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["val_acc"][0]["epoch"], 3);
        assert_eq!(parsed["val_acc"][0]["value"], 0.5);
    }
}
