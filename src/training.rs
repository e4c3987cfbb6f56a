use std::sync::Arc;
use std::time::Instant;

use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    lr_scheduler::LrScheduler,
    module::AutodiffModule,
    optim::{Optimizer, RmsPropConfig},
    prelude::*,
    tensor::backend::AutodiffBackend,
    train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep},
};

use crate::augment::AugmentedDataset;
use crate::config::{AugmentationConfig, ExperimentConfig};
use crate::data::{Cifar10Batch, Cifar10Batcher};
use crate::dataset::Cifar10Item;
use crate::error::{ExperimentError, Result};
use crate::evaluation::{evaluate_loader, Evaluation, MetricTotals};
use crate::model::{categorical_cross_entropy, Cifar10Cnn};
use crate::schedule::InverseTimeDecayLrSchedulerConfig;

impl<B: Backend> Cifar10Cnn<B> {
    pub fn forward_classification(&self, batch: Cifar10Batch<B>) -> ClassificationOutput<B> {
        let logits = self.forward_logits(batch.images);
        let loss = categorical_cross_entropy(logits.clone(), batch.targets);

        ClassificationOutput {
            loss,
            output: logits,
            targets: batch.labels,
        }
    }
}

impl<B: AutodiffBackend> TrainStep<Cifar10Batch<B>, ClassificationOutput<B>> for Cifar10Cnn<B> {
    fn step(&self, batch: Cifar10Batch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch);

        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<Cifar10Batch<B>, ClassificationOutput<B>> for Cifar10Cnn<B> {
    fn step(&self, batch: Cifar10Batch<B>) -> ClassificationOutput<B> {
        self.forward_classification(batch)
    }
}

/// How training items are fed to the model.
#[derive(Clone, Debug)]
pub enum TrainingMode {
    /// Every epoch iterates the shuffled training split once.
    Direct,
    /// Every epoch iterates `floor(len / batch_size)` batches of randomly perturbed items.
    Augmented(AugmentationConfig),
}

impl TrainingMode {
    pub fn from_config(config: &ExperimentConfig) -> Self {
        if config.augmentation {
            Self::Augmented(config.augmentation_config.clone())
        } else {
            Self::Direct
        }
    }
}

/// Number of batches drawn from the augmented stream per epoch.
pub fn steps_per_epoch(num_samples: usize, batch_size: usize) -> usize {
    num_samples / batch_size
}

/// Per-epoch metrics of a training run.
#[derive(Clone, Debug, Default)]
pub struct TrainingHistory {
    pub train: Vec<Evaluation>,
    pub valid: Vec<Evaluation>,
}

impl TrainingHistory {
    pub fn train_loss(&self) -> Vec<f64> {
        self.train.iter().map(|epoch| epoch.loss).collect()
    }

    pub fn num_epochs(&self) -> usize {
        self.train.len()
    }
}

/// Fits the model on the training split.
///
/// The test split is evaluated after every epoch for reporting only.
pub fn train<B, DT, DV>(
    config: &ExperimentConfig,
    mode: TrainingMode,
    mut model: Cifar10Cnn<B>,
    dataset_train: DT,
    dataset_test: DV,
    device: &B::Device,
) -> Result<(Cifar10Cnn<B>, TrainingHistory)>
where
    B: AutodiffBackend,
    DT: Dataset<Cifar10Item> + 'static,
    DV: Dataset<Cifar10Item> + 'static,
{
    B::seed(config.seed);

    let num_samples = dataset_train.len();
    let (dataloader_train, max_steps) = match mode {
        TrainingMode::Direct => {
            println!("Not using data augmentation.");
            (
                train_loader::<B, _>(config, dataset_train, device),
                usize::MAX,
            )
        }
        TrainingMode::Augmented(augmentation) => {
            println!("Using real-time data augmentation.");
            let steps = steps_per_epoch(num_samples, config.batch_size);
            if steps == 0 {
                log::warn!(
                    "{num_samples} samples do not fill a batch of {}, no update will happen",
                    config.batch_size
                );
            }
            let dataset = AugmentedDataset::new(dataset_train, augmentation, config.seed);

            (train_loader::<B, _>(config, dataset, device), steps)
        }
    };

    let dataloader_test: Arc<dyn DataLoader<B::InnerBackend, Cifar10Batch<B::InnerBackend>>> =
        DataLoaderBuilder::new(Cifar10Batcher::default())
            .batch_size(config.batch_size)
            .num_workers(config.num_workers)
            .set_device(device.clone())
            .build(dataset_test);

    let mut optim = RmsPropConfig::new()
        .with_alpha(0.9)
        .with_epsilon(1e-7)
        .init::<B, Cifar10Cnn<B>>();
    let mut scheduler = InverseTimeDecayLrSchedulerConfig::new(config.learning_rate, config.decay)
        .init()
        .map_err(ExperimentError::InvalidConfig)?;

    let mut history = TrainingHistory::default();
    let now = Instant::now();

    for epoch in 1..=config.num_epochs {
        log::info!("Executing training step for epoch {epoch}");
        let mut totals = MetricTotals::default();

        for batch in dataloader_train.iter().take(max_steps) {
            let lr = scheduler.step();
            let output = TrainStep::step(&model, batch);
            totals.record(&output.item);
            model = optim.step(lr, model, output.grads);
        }
        let train = totals.finish();

        log::info!("Executing validation step for epoch {epoch}");
        let valid = evaluate_loader(&model.valid(), dataloader_test.as_ref());

        let line = format!(
            "Epoch {epoch}/{} - loss: {:.4} - acc: {:.4} - val_loss: {:.4} - val_acc: {:.4}",
            config.num_epochs, train.loss, train.accuracy, valid.loss, valid.accuracy
        );
        log::info!("{line}");
        println!("{line}");

        history.train.push(train);
        history.valid.push(valid);
    }

    let elapsed = now.elapsed().as_secs();
    println!("Training completed in {}m{}s", elapsed / 60, elapsed % 60);

    Ok((model, history))
}

fn train_loader<B, D>(
    config: &ExperimentConfig,
    dataset: D,
    device: &B::Device,
) -> Arc<dyn DataLoader<B, Cifar10Batch<B>>>
where
    B: Backend,
    D: Dataset<Cifar10Item> + 'static,
{
    DataLoaderBuilder::new(Cifar10Batcher::default())
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .set_device(device.clone())
        .build(dataset)
}
