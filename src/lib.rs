pub mod augment;
pub mod cli;
pub mod config;
pub mod data;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod experiment;
pub mod labels;
pub mod logger;
pub mod model;
pub mod persistence;
pub mod schedule;
pub mod show;
pub mod training;

pub use config::{AugmentationConfig, ExperimentConfig};
pub use error::{ExperimentError, Result};
pub use experiment::{run, run_cifar10, ExperimentReport, ModelSource};
