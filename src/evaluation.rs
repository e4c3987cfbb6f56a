use std::sync::Arc;

use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    prelude::*,
    tensor::ElementConversion,
    train::{ClassificationOutput, ValidStep},
};

use crate::data::{Cifar10Batch, Cifar10Batcher};
use crate::dataset::Cifar10Item;
use crate::model::Cifar10Cnn;

/// Loss and accuracy of a model over a whole split.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
}

/// Running sums of classification outputs, weighted by batch size.
#[derive(Default)]
pub(crate) struct MetricTotals {
    loss_sum: f64,
    correct: usize,
    samples: usize,
}

impl MetricTotals {
    pub(crate) fn record<B: Backend>(&mut self, output: &ClassificationOutput<B>) {
        let [batch_size] = output.targets.dims();
        let loss = output.loss.clone().into_scalar().elem::<f64>();
        let correct = output
            .output
            .clone()
            .argmax(1)
            .flatten::<1>(0, 1)
            .equal(output.targets.clone())
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>();

        self.loss_sum += loss * batch_size as f64;
        self.correct += correct as usize;
        self.samples += batch_size;
    }

    pub(crate) fn finish(self) -> Evaluation {
        if self.samples == 0 {
            log::warn!("No samples were processed, reporting empty metrics");
            return Evaluation::default();
        }

        Evaluation {
            loss: self.loss_sum / self.samples as f64,
            accuracy: self.correct as f64 / self.samples as f64,
        }
    }
}

/// Evaluates a model on every batch of a loader, in loader order.
pub(crate) fn evaluate_loader<B: Backend>(
    model: &Cifar10Cnn<B>,
    dataloader: &dyn DataLoader<B, Cifar10Batch<B>>,
) -> Evaluation {
    let mut totals = MetricTotals::default();

    for batch in dataloader.iter() {
        let output = ValidStep::step(model, batch);
        totals.record(&output);
    }

    totals.finish()
}

/// Computes the loss and accuracy of a model over a whole split in a single pass.
pub fn evaluate<B, D>(
    model: &Cifar10Cnn<B>,
    dataset: D,
    batch_size: usize,
    device: &B::Device,
) -> Evaluation
where
    B: Backend,
    D: Dataset<Cifar10Item> + 'static,
{
    let dataloader: Arc<dyn DataLoader<B, Cifar10Batch<B>>> =
        DataLoaderBuilder::new(Cifar10Batcher::default())
            .batch_size(batch_size)
            .set_device(device.clone())
            .build(dataset);

    evaluate_loader(model, dataloader.as_ref())
}
