use std::path::Path;
use std::sync::Arc;

use burn::backend::{Autodiff, NdArray};
use cifar10::{
    dataset::{Cifar10Dataset, Cifar10Item, CHANNELS, HEIGHT, WIDTH},
    labels::LabelTable,
    persistence, run, ExperimentConfig, ExperimentError,
};

type TestBackend = Autodiff<NdArray>;

fn dataset(len: usize, offset: usize) -> Arc<Cifar10Dataset> {
    let items = (0..len)
        .map(|index| {
            let label = (index + offset) % 10;
            let image = (0..HEIGHT * WIDTH * CHANNELS)
                .map(|pixel| ((pixel * (label + 1) + index) % 256) as u8)
                .collect();

            Cifar10Item { image, label }
        })
        .collect();

    Arc::new(Cifar10Dataset::from_items(items))
}

fn config(dir: &Path) -> ExperimentConfig {
    let path = |name: &str| dir.join(name).to_str().unwrap().to_string();

    ExperimentConfig::new()
        .with_num_epochs(1)
        .with_batch_size(8)
        .with_num_workers(1)
        .with_artifact_path(path("artifacts/cifar10_trained_model"))
        .with_summary_path(path("summary.txt"))
        .with_grid_path(path("predictions.png"))
        .with_plot_dir(path("plots"))
}

#[test]
fn trained_artifact_is_reloaded_and_evaluated() {
    let device = Default::default();
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());

    let trained = run::<TestBackend, _, _>(
        &config.clone().with_train(true),
        LabelTable::cifar10(),
        dataset(24, 0),
        dataset(16, 3),
        &device,
    )
    .unwrap();

    let history = trained.history.expect("training returns its history");
    assert_eq!(history.num_epochs(), 1);
    assert!(persistence::record_path(&config.artifact_path).exists());
    assert!(persistence::config_path(&config.artifact_path).exists());
    assert!(dir.path().join("plots").join("Accuracy_1_false.png").exists());
    assert!(dir.path().join("predictions.png").exists());

    std::fs::remove_file(&config.summary_path).unwrap();

    let loaded = run::<TestBackend, _, _>(
        &config,
        LabelTable::cifar10(),
        dataset(24, 0),
        dataset(16, 3),
        &device,
    )
    .unwrap();

    assert!(loaded.history.is_none());
    assert!((0.0..=1.0).contains(&loaded.evaluation.accuracy));
    assert!(loaded.evaluation.loss >= 0.0);
    assert!((loaded.evaluation.loss - trained.evaluation.loss).abs() < 1e-5);
    assert_eq!(loaded.evaluation.accuracy, trained.evaluation.accuracy);
    assert_eq!(loaded.predictions, trained.predictions);
    assert_eq!(loaded.predictions.len(), 16);
    let table = LabelTable::cifar10();
    assert!(loaded
        .predictions
        .iter()
        .all(|label| table.iter().any(|name| name == label)));

    let summary = std::fs::read_to_string(&config.summary_path).unwrap();
    assert!(summary.contains("Total params: 1250858"));
}

#[test]
fn augmented_training_writes_its_own_plot() {
    let device = Default::default();
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path())
        .with_train(true)
        .with_augmentation(true);

    let report = run::<TestBackend, _, _>(
        &config,
        LabelTable::cifar10(),
        dataset(16, 0),
        dataset(16, 5),
        &device,
    )
    .unwrap();

    assert_eq!(report.history.unwrap().num_epochs(), 1);
    assert!(dir.path().join("plots").join("Accuracy_1_true.png").exists());
}

#[test]
fn loading_without_an_artifact_fails() {
    let device = Default::default();
    let dir = tempfile::tempdir().unwrap();

    let result = run::<TestBackend, _, _>(
        &config(dir.path()),
        LabelTable::cifar10(),
        dataset(8, 0),
        dataset(16, 0),
        &device,
    );

    assert!(matches!(result, Err(ExperimentError::ArtifactMissing(_))));
    assert!(!dir.path().join("predictions.png").exists());
}
