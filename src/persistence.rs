use std::path::{Path, PathBuf};

use burn::{
    config::{Config, ConfigError},
    module::Module,
    prelude::Backend,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, RecorderError},
};

use crate::error::{ExperimentError, Result};
use crate::model::{Cifar10Cnn, ModelConfig};

/// Extension of the file holding the parameters.
pub const RECORD_EXTENSION: &str = "mpk";
/// Extension of the file holding the model configuration.
pub const CONFIG_EXTENSION: &str = "json";

type ArtifactRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// File that stores the parameters of the artifact at `path`.
pub fn record_path<P: AsRef<Path>>(path: P) -> PathBuf {
    path.as_ref().with_extension(RECORD_EXTENSION)
}

/// File that stores the architecture of the artifact at `path`.
pub fn config_path<P: AsRef<Path>>(path: P) -> PathBuf {
    path.as_ref().with_extension(CONFIG_EXTENSION)
}

/// Writes the architecture and the parameters of a model, replacing any previous artifact.
pub fn save<B: Backend, P: AsRef<Path>>(
    model: &Cifar10Cnn<B>,
    model_config: &ModelConfig,
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|err| ExperimentError::io(parent, err))?;
    }

    let config_file = config_path(path);
    model_config
        .save(&config_file)
        .map_err(|err| ExperimentError::io(&config_file, err))?;

    model
        .clone()
        .save_file(record_path(path), &ArtifactRecorder::new())
        .map_err(|err| record_error(path, err))?;

    println!("Saved trained model at {}", path.display());
    log::info!("Saved model artifact at {}", path.display());
    Ok(())
}

/// Rebuilds a model from an artifact written by [save].
pub fn load<B: Backend, P: AsRef<Path>>(
    path: P,
    device: &B::Device,
) -> Result<(Cifar10Cnn<B>, ModelConfig)> {
    let path = path.as_ref();
    for file in [config_path(path), record_path(path)] {
        if !file.exists() {
            return Err(ExperimentError::ArtifactMissing(file));
        }
    }

    let config_file = config_path(path);
    let model_config = ModelConfig::load(&config_file).map_err(|err| match err {
        ConfigError::FileNotFound(_) => ExperimentError::ArtifactMissing(config_file.clone()),
        err => ExperimentError::ArtifactCorrupt {
            path: config_file.clone(),
            reason: err.to_string(),
        },
    })?;

    let model = model_config
        .init::<B>(device)
        .load_file(record_path(path), &ArtifactRecorder::new(), device)
        .map_err(|err| record_error(path, err))?;

    log::info!("Loaded model artifact from {}", path.display());
    Ok((model, model_config))
}

fn record_error(path: &Path, err: RecorderError) -> ExperimentError {
    let file = record_path(path);

    match err {
        RecorderError::FileNotFound(_) => ExperimentError::ArtifactMissing(file),
        err => ExperimentError::ArtifactCorrupt {
            path: file,
            reason: err.to_string(),
        },
    }
}
