use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::dataset::{Cifar10Item, CHANNELS, HEIGHT, WIDTH};
use crate::labels::{one_hot_tensor, NUM_CLASSES};

/// Rescales a pixel intensity from `[0, 255]` to `[0, 1]`.
pub fn normalize_pixel(pixel: u8) -> f32 {
    pixel as f32 / 255.0
}

/// Inverse of [normalize_pixel], rounding to the closest intensity.
pub fn denormalize_pixel(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

#[derive(Clone, Default)]
pub struct Cifar10Batcher {}

#[derive(Clone, Debug)]
pub struct Cifar10Batch<B: Backend> {
    /// Normalized images, `[batch_size, channels, height, width]`.
    pub images: Tensor<B, 4>,
    /// One-hot targets, `[batch_size, num_classes]`.
    pub targets: Tensor<B, 2>,
    /// Class ids, `[batch_size]`.
    pub labels: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, Cifar10Item, Cifar10Batch<B>> for Cifar10Batcher {
    fn batch(&self, items: Vec<Cifar10Item>, device: &B::Device) -> Cifar10Batch<B> {
        let batch_size = items.len();

        let pixels = items
            .iter()
            .flat_map(|item| item.image.iter().copied().map(normalize_pixel))
            .collect::<Vec<f32>>();
        let images = TensorData::new(pixels, [batch_size, HEIGHT, WIDTH, CHANNELS]);
        let images = Tensor::<B, 4>::from_data(images.convert::<B::FloatElem>(), device)
            // [N, H, W, C] -> [N, C, H, W]
            .permute([0, 3, 1, 2]);

        let classes = items.iter().map(|item| item.label).collect::<Vec<_>>();
        let targets = one_hot_tensor(&classes, NUM_CLASSES, device);

        let labels = TensorData::new(
            classes.iter().map(|class| *class as i64).collect::<Vec<_>>(),
            [batch_size],
        );
        let labels = Tensor::<B, 1, Int>::from_data(labels.convert::<B::IntElem>(), device);

        Cifar10Batch {
            images,
            targets,
            labels,
        }
    }
}
