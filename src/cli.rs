use std::path::PathBuf;

use burn::config::Config;
use clap::Parser;

use crate::config::ExperimentConfig;
use crate::error::{ExperimentError, Result};

/// Trains or loads a CIFAR-10 classifier, then evaluates it and shows a few predictions.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    /// JSON experiment configuration to start from, defaults are used otherwise.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Train a new model instead of loading the artifact.
    #[arg(long)]
    pub train: bool,
    /// Feed randomly perturbed images during training.
    #[arg(long)]
    pub augment: bool,
    #[arg(short, long)]
    pub epochs: Option<usize>,
    #[arg(short, long)]
    pub batch_size: Option<usize>,
    /// Artifact location, without extension.
    #[arg(short, long)]
    pub artifact: Option<String>,
    #[arg(long, default_value = "experiment.log")]
    pub log_file: PathBuf,
}

impl Cli {
    /// Merges the command line overrides into the configuration file, if any.
    pub fn into_config(self) -> Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::load(path).map_err(|err| {
                ExperimentError::InvalidConfig(format!("`{}`: {err}", path.display()))
            })?,
            None => ExperimentConfig::new(),
        };

        if self.train {
            config.train = true;
        }
        if self.augment {
            config.augmentation = true;
        }
        if let Some(epochs) = self.epochs {
            config.num_epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(artifact) = self.artifact {
            config.artifact_path = artifact;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_keep_the_defaults() {
        let config = Cli::try_parse_from(["cifar10"])
            .unwrap()
            .into_config()
            .unwrap();

        assert!(!config.train);
        assert_eq!(config.num_epochs, 3);
        assert_eq!(config.artifact_path, "cifar10_trained_model");
    }

    #[test]
    fn flags_override_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.json");
        ExperimentConfig::new()
            .with_batch_size(64)
            .with_num_epochs(10)
            .save(&path)
            .unwrap();

        let config = Cli::try_parse_from([
            "cifar10",
            "--config",
            path.to_str().unwrap(),
            "--train",
            "--augment",
            "--epochs",
            "2",
            "--artifact",
            "out/model",
        ])
        .unwrap()
        .into_config()
        .unwrap();

        assert!(config.train);
        assert!(config.augmentation);
        assert_eq!(config.num_epochs, 2);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.artifact_path, "out/model");
    }

    #[test]
    fn unreadable_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{").unwrap();

        let result = Cli::try_parse_from(["cifar10", "--config", path.to_str().unwrap()])
            .unwrap()
            .into_config();

        assert!(matches!(result, Err(ExperimentError::InvalidConfig(_))));
    }

    #[test]
    fn zero_epochs_are_rejected() {
        let result = Cli::try_parse_from(["cifar10", "--epochs", "0"])
            .unwrap()
            .into_config();

        assert!(result.is_err());
    }
}
