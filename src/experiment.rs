use std::path::PathBuf;
use std::sync::Arc;

use burn::{data::dataset::Dataset, module::AutodiffModule, tensor::backend::AutodiffBackend};

use crate::config::ExperimentConfig;
use crate::dataset::{Cifar10Dataset, Cifar10Item, CHANNELS, HEIGHT, WIDTH};
use crate::error::{ExperimentError, Result};
use crate::evaluation::{evaluate, Evaluation};
use crate::labels::{LabelTable, NUM_CLASSES};
use crate::model::{write_summary, Cifar10Cnn, ModelConfig};
use crate::persistence;
use crate::show::{plot_loss, Presenter};
use crate::training::{train, TrainingHistory, TrainingMode};

/// Where the model of a run comes from.
#[derive(Clone, Debug)]
pub enum ModelSource {
    /// Fit a freshly initialized model, then persist it.
    Train(TrainingMode),
    /// Rebuild a model persisted by an earlier run.
    LoadFromArtifact(PathBuf),
}

impl ModelSource {
    pub fn from_config(config: &ExperimentConfig) -> Self {
        if config.train {
            Self::Train(TrainingMode::from_config(config))
        } else {
            Self::LoadFromArtifact(PathBuf::from(&config.artifact_path))
        }
    }

    /// Produces the model the rest of the run works with, ready for inference.
    ///
    /// The training history is only returned by [ModelSource::Train].
    pub fn resolve<B, DT, DV>(
        self,
        config: &ExperimentConfig,
        input_shape: [usize; 3],
        dataset_train: Arc<DT>,
        dataset_test: Arc<DV>,
        device: &B::Device,
    ) -> Result<(Cifar10Cnn<B::InnerBackend>, Option<TrainingHistory>)>
    where
        B: AutodiffBackend,
        DT: Dataset<Cifar10Item> + 'static,
        DV: Dataset<Cifar10Item> + 'static,
    {
        match self {
            Self::Train(mode) => {
                let model_config = ModelConfig::new(input_shape, NUM_CLASSES);
                let model = model_config.init::<B>(device);
                write_summary(&model, &config.summary_path)?;

                let (model, history) =
                    train(config, mode, model, dataset_train, dataset_test, device)?;
                persistence::save(&model, &model_config, &config.artifact_path)?;
                plot_loss(&history, config.loss_plot_path())?;

                Ok((model.valid(), Some(history)))
            }
            Self::LoadFromArtifact(path) => {
                let (model, model_config) = persistence::load::<B::InnerBackend, _>(&path, device)?;
                model_config.check_input(input_shape)?;
                write_summary(&model, &config.summary_path)?;

                Ok((model, None))
            }
        }
    }
}

/// What a run produced, on top of the files it wrote.
#[derive(Clone, Debug)]
pub struct ExperimentReport {
    pub evaluation: Evaluation,
    /// Predicted label of the first test samples, in dataset order.
    pub predictions: Vec<String>,
    pub history: Option<TrainingHistory>,
}

/// Runs the whole experiment on the given splits.
pub fn run<B, DT, DV>(
    config: &ExperimentConfig,
    labels: LabelTable,
    dataset_train: Arc<DT>,
    dataset_test: Arc<DV>,
    device: &B::Device,
) -> Result<ExperimentReport>
where
    B: AutodiffBackend,
    DT: Dataset<Cifar10Item> + 'static,
    DV: Dataset<Cifar10Item> + 'static,
{
    config.validate()?;

    let input_shape = sample_shape(dataset_train.as_ref())?;
    let [height, width, channels] = input_shape;
    println!(
        "x_train shape: [{}, {height}, {width}, {channels}]",
        dataset_train.len()
    );
    println!("{} train samples", dataset_train.len());
    println!("{} test samples", dataset_test.len());

    let source = ModelSource::from_config(config);
    log::info!("Resolving the model from {source:?}");
    let (model, history) = source.resolve::<B, _, _>(
        config,
        input_shape,
        dataset_train,
        dataset_test.clone(),
        device,
    )?;

    let evaluation = evaluate(&model, dataset_test.clone(), config.batch_size, device);
    println!("Test loss: {}", evaluation.loss);
    println!("Test accuracy: {}", evaluation.accuracy);
    log::info!("Test evaluation: {evaluation:?}");

    let predictions =
        Presenter::new(labels).present(&model, dataset_test.as_ref(), &config.grid_path, device)?;

    Ok(ExperimentReport {
        evaluation,
        predictions,
        history,
    })
}

/// Downloads CIFAR-10 when needed and runs the experiment on it.
pub fn run_cifar10<B: AutodiffBackend>(
    config: &ExperimentConfig,
    device: &B::Device,
) -> Result<ExperimentReport> {
    let dataset_train = Arc::new(Cifar10Dataset::train()?);
    let dataset_test = Arc::new(Cifar10Dataset::test()?);

    run::<B, _, _>(
        config,
        LabelTable::cifar10(),
        dataset_train,
        dataset_test,
        device,
    )
}

/// Per-sample `[height, width, channels]` of a split, checked on its first item.
fn sample_shape<D: Dataset<Cifar10Item> + ?Sized>(dataset: &D) -> Result<[usize; 3]> {
    let item = dataset.get(0).ok_or_else(|| {
        ExperimentError::MalformedDataset("the training split is empty".to_string())
    })?;

    let expected = [HEIGHT, WIDTH, CHANNELS];
    if item.image.len() != expected.iter().product::<usize>() {
        return Err(ExperimentError::ShapeMismatch {
            expected: expected.to_vec(),
            found: vec![item.image.len()],
        });
    }

    Ok(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_follows_the_train_flag() {
        let load = ModelSource::from_config(
            &ExperimentConfig::new().with_artifact_path("out/model".to_string()),
        );
        let fit = ModelSource::from_config(
            &ExperimentConfig::new()
                .with_train(true)
                .with_augmentation(true),
        );

        assert!(matches!(
            load,
            ModelSource::LoadFromArtifact(path) if path == PathBuf::from("out/model")
        ));
        assert!(matches!(
            fit,
            ModelSource::Train(TrainingMode::Augmented(_))
        ));
    }

    #[test]
    fn empty_split_has_no_shape() {
        let dataset = Cifar10Dataset::from_items(Vec::new());

        assert!(matches!(
            sample_shape(&dataset),
            Err(ExperimentError::MalformedDataset(_))
        ));
    }

    #[test]
    fn truncated_sample_is_rejected() {
        let dataset = Cifar10Dataset::from_items(vec![Cifar10Item {
            image: vec![0; 10],
            label: 0,
        }]);

        assert!(matches!(
            sample_shape(&dataset),
            Err(ExperimentError::ShapeMismatch { .. })
        ));
    }
}
