pub mod hparams;
pub mod model;
pub mod training;
pub mod data;
