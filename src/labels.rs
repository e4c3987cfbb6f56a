use burn::prelude::*;

/// Number of CIFAR-10 categories.
pub const NUM_CLASSES: usize = 10;

/// CIFAR-10 category names, index-aligned with the integer class ids.
pub const CIFAR10_LABELS: [&str; NUM_CLASSES] = [
    "airplane",
    "automobile",
    "bird",
    "cat",
    "deer",
    "dog",
    "frog",
    "horse",
    "ship",
    "truck",
];

/// Ordered, immutable table of human readable class names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelTable {
    names: Vec<String>,
}

impl LabelTable {
    /// Creates a table from names ordered by class id.
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            names: names.iter().map(|name| name.as_ref().to_string()).collect(),
        }
    }

    /// The CIFAR-10 table.
    pub fn cifar10() -> Self {
        Self::new(&CIFAR10_LABELS)
    }

    /// Name of the given class id, if it is part of the table.
    pub fn name(&self, class: usize) -> Option<&str> {
        self.names.get(class).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::cifar10()
    }
}

/// Encodes class ids as one-hot rows.
///
/// The result is row-major with shape `[labels.len(), num_classes]`. Ids must be lower than
/// `num_classes`.
pub fn one_hot(labels: &[usize], num_classes: usize) -> Vec<f32> {
    let mut encoded = vec![0.0; labels.len() * num_classes];

    for (row, &label) in labels.iter().enumerate() {
        debug_assert!(label < num_classes, "Label {label} is out of range");
        encoded[row * num_classes + label] = 1.0;
    }

    encoded
}

/// Same as [one_hot], as a `[labels.len(), num_classes]` tensor.
pub fn one_hot_tensor<B: Backend>(
    labels: &[usize],
    num_classes: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let data = TensorData::new(one_hot(labels, num_classes), [labels.len(), num_classes]);

    Tensor::from_data(data.convert::<B::FloatElem>(), device)
}
