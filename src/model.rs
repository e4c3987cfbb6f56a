use std::fs;
use std::path::Path;

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Initializer, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
    tensor::activation::{log_softmax, softmax},
};

use crate::error::ExperimentError;

// Smallest side that survives two `valid` convolutions and two poolings.
const MIN_SIDE: usize = 8;

#[derive(Config, Debug)]
pub struct ModelConfig {
    /// Per-sample shape as `[height, width, channels]`.
    pub input_shape: [usize; 3],
    pub num_classes: usize,
    /// Filters of the first and second convolution blocks.
    #[config(default = "[32, 64]")]
    pub filters: [usize; 2],
    #[config(default = 512)]
    pub hidden_size: usize,
    #[config(default = 0.25)]
    pub conv_dropout: f64,
    #[config(default = 0.5)]
    pub dense_dropout: f64,
}

/// Two convolution blocks followed by a two layer classifier head.
#[derive(Module, Debug)]
pub struct Cifar10Cnn<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool1: MaxPool2d,
    dropout1: Dropout,
    conv3: Conv2d<B>,
    conv4: Conv2d<B>,
    pool2: MaxPool2d,
    dropout2: Dropout,
    fc1: Linear<B>,
    dropout3: Dropout,
    fc2: Linear<B>,
    activation: Relu,
}

impl ModelConfig {
    /// Number of features entering the classifier head.
    ///
    /// Each block keeps the side with a `same` convolution, removes 2 with a `valid` one and
    /// halves it with pooling.
    pub fn flattened_features(&self) -> usize {
        let [height, width, _] = self.input_shape;
        let block = |side: usize| (side - 2) / 2;

        block(block(height)) * block(block(width)) * self.filters[1]
    }

    /// Checks that a sample shape is the one this model was built for.
    pub fn check_input(&self, shape: [usize; 3]) -> crate::error::Result<()> {
        if shape != self.input_shape {
            return Err(ExperimentError::ShapeMismatch {
                expected: self.input_shape.to_vec(),
                found: shape.to_vec(),
            });
        }

        Ok(())
    }

    /// Returns the initialized model.
    ///
    /// # Panics
    /// This function panics if the input is smaller than 8x8.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Cifar10Cnn<B> {
        let [height, width, channels] = self.input_shape;
        assert!(
            height >= MIN_SIDE && width >= MIN_SIDE,
            "Input images must be at least {MIN_SIDE}x{MIN_SIDE}, got {height}x{width}"
        );
        let [filters1, filters2] = self.filters;

        let conv = |channels: [usize; 2], padding: PaddingConfig2d| -> Conv2d<B> {
            Conv2dConfig::new(channels, [3, 3])
                .with_padding(padding)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device)
        };
        let pool = || MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        let linear = |d_input: usize, d_output: usize| -> Linear<B> {
            LinearConfig::new(d_input, d_output)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device)
        };

        Cifar10Cnn {
            conv1: conv([channels, filters1], PaddingConfig2d::Same),
            conv2: conv([filters1, filters1], PaddingConfig2d::Valid),
            pool1: pool(),
            dropout1: DropoutConfig::new(self.conv_dropout).init(),
            conv3: conv([filters1, filters2], PaddingConfig2d::Same),
            conv4: conv([filters2, filters2], PaddingConfig2d::Valid),
            pool2: pool(),
            dropout2: DropoutConfig::new(self.conv_dropout).init(),
            fc1: linear(self.flattened_features(), self.hidden_size),
            dropout3: DropoutConfig::new(self.dense_dropout).init(),
            fc2: linear(self.hidden_size, self.num_classes),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> Cifar10Cnn<B> {
    /// Class scores before the softmax.
    ///
    /// # Shapes
    ///   - Images [batch_size, channels, height, width]
    ///   - Output [batch_size, num_classes]
    pub fn forward_logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.conv1.forward(images));
        let x = self.activation.forward(self.conv2.forward(x));
        let x = self.dropout1.forward(self.pool1.forward(x));

        let x = self.activation.forward(self.conv3.forward(x));
        let x = self.activation.forward(self.conv4.forward(x));
        let x = self.dropout2.forward(self.pool2.forward(x));

        let x = x.flatten::<2>(1, 3);
        let x = self.activation.forward(self.fc1.forward(x));
        let x = self.dropout3.forward(x);

        self.fc2.forward(x)
    }

    /// Categorical distribution over the classes, one row per image.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward_logits(images), 1)
    }

    /// Index of the most likely class of every image.
    pub fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 1, Int> {
        self.forward(images).argmax(1).flatten::<1>(0, 1)
    }
}

/// Mean categorical cross-entropy between logits and one-hot targets.
pub fn categorical_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let log_probs = log_softmax(logits, 1);

    (targets * log_probs).sum_dim(1).mean().neg()
}

/// Writes a human readable description of the model layers and parameter count.
pub fn write_summary<B: Backend, P: AsRef<Path>>(
    model: &Cifar10Cnn<B>,
    path: P,
) -> crate::error::Result<()> {
    let path = path.as_ref();
    let summary = format!("{model}\nTotal params: {}\n", model.num_params());

    fs::write(path, summary).map_err(|err| ExperimentError::io(path, err))
}
