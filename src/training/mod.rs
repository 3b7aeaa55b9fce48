pub mod error;
pub mod step;
pub mod metrics;
pub mod logger;
pub mod callbacks;
pub mod trainer;

pub use error::{MetricError, TrainError};
pub use trainer::Trainer;
