use std::path::PathBuf;

use burn::config::Config;

use crate::error::ExperimentError;

/// Random perturbations applied to training images when augmentation is on.
#[derive(Config, Debug)]
pub struct AugmentationConfig {
    /// Maximum absolute rotation, in degrees.
    #[config(default = 15.0)]
    pub rotation_range: f32,
    /// Maximum horizontal shift, as a fraction of the image width.
    #[config(default = 0.1)]
    pub width_shift_range: f32,
    /// Maximum vertical shift, as a fraction of the image height.
    #[config(default = 0.1)]
    pub height_shift_range: f32,
    /// Mirror half of the images left to right.
    #[config(default = true)]
    pub horizontal_flip: bool,
}

/// Everything a run needs to know, passed explicitly to each step.
#[derive(Config, Debug)]
pub struct ExperimentConfig {
    #[config(default = 32)]
    pub batch_size: usize,
    /// Used by both the direct and the augmented training paths.
    #[config(default = 3)]
    pub num_epochs: usize,
    #[config(default = false)]
    pub augmentation: bool,
    /// Train a fresh model when set, load `artifact_path` otherwise.
    #[config(default = false)]
    pub train: bool,
    /// Artifact location without extension; `.mpk` and `.json` are appended.
    #[config(default = "String::from(\"cifar10_trained_model\")")]
    pub artifact_path: String,
    #[config(default = "String::from(\"summary.txt\")")]
    pub summary_path: String,
    #[config(default = "String::from(\"predictions.png\")")]
    pub grid_path: String,
    /// Directory receiving the loss curve.
    #[config(default = "String::from(\".\")")]
    pub plot_dir: String,
    #[config(default = 4)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 1e-4)]
    pub learning_rate: f64,
    /// Inverse time decay applied to the learning rate after every update.
    #[config(default = 1e-6)]
    pub decay: f64,
    #[config(default = "AugmentationConfig::new()")]
    pub augmentation_config: AugmentationConfig,
}

impl ExperimentConfig {
    /// Rejects values no run can work with.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.batch_size == 0 {
            return Err(ExperimentError::InvalidConfig(
                "batch size must be greater than 0".to_string(),
            ));
        }
        if self.num_epochs == 0 {
            return Err(ExperimentError::InvalidConfig(
                "number of epochs must be greater than 0".to_string(),
            ));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(ExperimentError::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.decay.is_nan() || self.decay < 0.0 {
            return Err(ExperimentError::InvalidConfig(format!(
                "decay must not be negative, got {}",
                self.decay
            )));
        }
        if self.num_workers == 0 {
            return Err(ExperimentError::InvalidConfig(
                "number of workers must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Where the loss curve of a training run is written.
    pub fn loss_plot_path(&self) -> PathBuf {
        PathBuf::from(&self.plot_dir).join(format!(
            "Accuracy_{}_{}.png",
            self.num_epochs, self.augmentation
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = ExperimentConfig::new();

        assert_eq!(config.batch_size, 32);
        assert_eq!(config.num_epochs, 3);
        assert!(!config.augmentation);
        assert!(!config.train);
        assert_eq!(config.artifact_path, "cifar10_trained_model");
        assert_eq!(config.summary_path, "summary.txt");
        assert_eq!(config.learning_rate, 1e-4);
        assert_eq!(config.decay, 1e-6);
        assert_eq!(config.augmentation_config.rotation_range, 15.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn loss_plot_name_encodes_epochs_and_augmentation() {
        let config = ExperimentConfig::new()
            .with_num_epochs(2)
            .with_augmentation(true)
            .with_plot_dir("plots".to_string());

        assert_eq!(
            config.loss_plot_path(),
            PathBuf::from("plots").join("Accuracy_2_true.png")
        );
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = ExperimentConfig::new().with_batch_size(0);

        assert!(matches!(
            config.validate(),
            Err(ExperimentError::InvalidConfig(_))
        ));
    }

    #[test]
    fn zero_epochs_are_rejected() {
        let config = ExperimentConfig::new().with_num_epochs(0);

        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_workers_are_rejected() {
        let config = ExperimentConfig::new().with_num_workers(0);

        assert!(matches!(
            config.validate(),
            Err(ExperimentError::InvalidConfig(_))
        ));
    }

    #[test]
    fn nan_or_negative_decay_is_rejected() {
        assert!(ExperimentConfig::new().with_decay(f64::NAN).validate().is_err());
        assert!(ExperimentConfig::new().with_decay(-1e-6).validate().is_err());
        assert!(ExperimentConfig::new().with_decay(0.0).validate().is_ok());
    }

    #[test]
    fn config_survives_a_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = ExperimentConfig::new().with_train(true).with_num_epochs(7);

        config.save(&path).unwrap();
        let loaded = ExperimentConfig::load(&path).unwrap();

        assert!(loaded.train);
        assert_eq!(loaded.num_epochs, 7);
        assert_eq!(loaded.batch_size, config.batch_size);
    }
}
