use std::fs;
use std::path::Path;

use burn::{data::dataloader::batcher::Batcher, data::dataset::Dataset, prelude::*};
use image::{Rgb, RgbImage};
use plotters::prelude::*;

use crate::data::{denormalize_pixel, Cifar10Batch, Cifar10Batcher};
use crate::dataset::{Cifar10Item, CHANNELS, HEIGHT, WIDTH};
use crate::error::{ExperimentError, Result};
use crate::labels::LabelTable;
use crate::model::Cifar10Cnn;
use crate::training::TrainingHistory;

pub const GRID_ROWS: usize = 4;
pub const GRID_COLS: usize = 4;
/// Number of test samples shown by [Presenter::present].
pub const SAMPLE_COUNT: usize = GRID_ROWS * GRID_COLS;
const _: () = assert!(SAMPLE_COUNT == 16, "The grid must hold exactly 16 samples");

// Every source pixel becomes a TILE_SCALE x TILE_SCALE square.
const TILE_SCALE: usize = 4;
const PLOT_SIZE: (u32, u32) = (640, 480);

/// Shows what a model predicts for the head of the test split.
pub struct Presenter {
    labels: LabelTable,
}

impl Presenter {
    pub fn new(labels: LabelTable) -> Self {
        Self { labels }
    }

    /// Renders the first [SAMPLE_COUNT] images of `dataset` in a grid and prints the predicted
    /// label of each one, row by row.
    ///
    /// Returns the printed labels.
    pub fn present<B, D, P>(
        &self,
        model: &Cifar10Cnn<B>,
        dataset: &D,
        path: P,
        device: &B::Device,
    ) -> Result<Vec<String>>
    where
        B: Backend,
        D: Dataset<Cifar10Item> + ?Sized,
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let items = (0..SAMPLE_COUNT)
            .filter_map(|index| dataset.get(index))
            .collect::<Vec<_>>();
        if items.len() < SAMPLE_COUNT {
            return Err(ExperimentError::MalformedDataset(format!(
                "the test split holds {} samples, {SAMPLE_COUNT} are needed for the grid",
                dataset.len()
            )));
        }

        let batch: Cifar10Batch<B> = Cifar10Batcher::default().batch(items, device);
        let classes = model
            .predict(batch.images.clone())
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|err| render_error(path, format!("{err:?}")))?;

        save_grid(batch.images, path)?;

        let predictions = classes
            .into_iter()
            .map(|class| self.label_of(class))
            .collect::<Vec<_>>();

        println!("Predictions:");
        for row in predictions.chunks(GRID_COLS) {
            println!("{}", row.join(", "));
        }
        log::info!("Predicted labels: {predictions:?}");

        Ok(predictions)
    }

    fn label_of(&self, class: i64) -> String {
        usize::try_from(class)
            .ok()
            .and_then(|class| self.labels.name(class))
            .map(str::to_string)
            .unwrap_or_else(|| format!("class {class}"))
    }
}

/// Draws a `[SAMPLE_COUNT, channels, height, width]` batch of normalized images as a grid.
fn save_grid<B: Backend>(images: Tensor<B, 4>, path: &Path) -> Result<()> {
    let [batch_size, channels, height, width] = images.dims();
    debug_assert_eq!(batch_size, SAMPLE_COUNT);
    debug_assert_eq!([channels, height, width], [CHANNELS, HEIGHT, WIDTH]);

    let pixels = images
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| render_error(path, format!("{err:?}")))?;

    let tile_height = height * TILE_SCALE;
    let tile_width = width * TILE_SCALE;
    let mut grid = RgbImage::new(
        (GRID_COLS * tile_width) as u32,
        (GRID_ROWS * tile_height) as u32,
    );

    for n in 0..batch_size {
        let (row, col) = (n / GRID_COLS, n % GRID_COLS);

        for y in 0..tile_height {
            for x in 0..tile_width {
                let (i, j) = (x / TILE_SCALE, y / TILE_SCALE);
                let pixel = [0, 1, 2].map(|c| {
                    denormalize_pixel(pixels[i + (j + (n * channels + c) * height) * width])
                });

                grid.put_pixel(
                    (col * tile_width + x) as u32,
                    (row * tile_height + y) as u32,
                    Rgb(pixel),
                );
            }
        }
    }

    create_parent(path)?;
    grid.save(path).map_err(|err| render_error(path, err))?;
    log::info!("Saved prediction grid at {}", path.display());

    Ok(())
}

/// Plots the training loss (blue) and the validation loss (red) of every epoch.
pub fn plot_loss<P: AsRef<Path>>(history: &TrainingHistory, path: P) -> Result<()> {
    let path = path.as_ref();
    if history.num_epochs() == 0 {
        return Err(render_error(path, "the history holds no epoch"));
    }

    let points = |losses: Vec<f64>| {
        losses
            .into_iter()
            .enumerate()
            .map(|(epoch, loss)| ((epoch + 1) as f64, loss))
            .collect::<Vec<_>>()
    };
    let train = points(history.train_loss());
    let valid = points(history.valid.iter().map(|epoch| epoch.loss).collect());

    let highest = train
        .iter()
        .chain(valid.iter())
        .map(|(_, loss)| *loss)
        .filter(|loss| loss.is_finite())
        .fold(0.0, f64::max);
    let y_max = if highest > 0.0 { highest * 1.1 } else { 1.0 };
    let x_max = history.num_epochs() as f64 + 0.5;

    create_parent(path)?;
    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|err| render_error(path, err))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d(0.5..x_max, 0.0..y_max)
        .map_err(|err| render_error(path, err))?;

    for (series, color) in [(train, BLUE), (valid, RED)] {
        chart
            .draw_series(LineSeries::new(series.iter().copied(), color.stroke_width(2)))
            .map_err(|err| render_error(path, err))?;
        chart
            .draw_series(
                series
                    .iter()
                    .map(|point| Circle::new(*point, 4, color.filled())),
            )
            .map_err(|err| render_error(path, err))?;
    }

    root.present().map_err(|err| render_error(path, err))?;
    log::info!("Saved loss curve at {}", path.display());

    Ok(())
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        Some(parent) => fs::create_dir_all(parent).map_err(|err| ExperimentError::io(parent, err)),
        None => Ok(()),
    }
}

fn render_error(path: &Path, reason: impl ToString) -> ExperimentError {
    ExperimentError::Render {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Cifar10Dataset;
    use crate::evaluation::Evaluation;
    use crate::model::ModelConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn dataset(len: usize) -> Cifar10Dataset {
        Cifar10Dataset::from_items(
            (0..len)
                .map(|index| Cifar10Item {
                    image: vec![(index * 15) as u8; HEIGHT * WIDTH * CHANNELS],
                    label: index % 10,
                })
                .collect(),
        )
    }

    #[test]
    fn grid_holds_every_sample_in_order() {
        let device = Default::default();
        let model = ModelConfig::new([32, 32, 3], 10).init::<TestBackend>(&device);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.png");

        let labels = Presenter::new(LabelTable::cifar10())
            .present(&model, &dataset(20), &path, &device)
            .unwrap();

        assert_eq!(labels.len(), SAMPLE_COUNT);
        assert!(labels
            .iter()
            .all(|label| LabelTable::cifar10().iter().any(|name| name == label)));

        let grid = image::open(&path).unwrap().to_rgb8();
        let tile = (WIDTH * TILE_SCALE) as u32;
        assert_eq!(grid.dimensions(), (4 * tile, 4 * tile));
        // Sample n is filled with n * 15 and sits at row n / 4, column n % 4.
        for n in 0..SAMPLE_COUNT as u32 {
            let pixel = grid.get_pixel((n % 4) * tile + 1, (n / 4) * tile + 1);
            assert_eq!(pixel.0, [(n * 15) as u8; 3]);
        }
    }

    #[test]
    fn substituted_label_table_is_used() {
        let device = Default::default();
        let model = ModelConfig::new([32, 32, 3], 10).init::<TestBackend>(&device);
        let dir = tempfile::tempdir().unwrap();
        let names = (0..10).map(|class| format!("c{class}")).collect::<Vec<_>>();

        let presenter = Presenter::new(LabelTable::new(&names));
        let labels = presenter
            .present(&model, &dataset(16), dir.path().join("grid.png"), &device)
            .unwrap();

        assert!(labels.iter().all(|label| names.contains(label)));
    }

    #[test]
    fn short_test_split_is_rejected() {
        let device = Default::default();
        let model = ModelConfig::new([32, 32, 3], 10).init::<TestBackend>(&device);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.png");

        let result =
            Presenter::new(LabelTable::cifar10()).present(&model, &dataset(5), &path, &device);

        assert!(matches!(result, Err(ExperimentError::MalformedDataset(_))));
        assert!(!path.exists());
    }

    #[test]
    fn loss_curve_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plots").join("Accuracy_2_false.png");
        let epoch = |loss| Evaluation {
            loss,
            accuracy: 0.5,
        };
        let history = TrainingHistory {
            train: vec![epoch(2.1), epoch(1.7)],
            valid: vec![epoch(2.0), epoch(1.8)],
        };

        plot_loss(&history, &path).unwrap();

        let plot = image::open(&path).unwrap();
        assert_eq!((plot.width(), plot.height()), PLOT_SIZE);
    }

    #[test]
    fn empty_history_is_not_plotted() {
        let dir = tempfile::tempdir().unwrap();

        let result = plot_loss(&TrainingHistory::default(), dir.path().join("loss.png"));

        assert!(matches!(result, Err(ExperimentError::Render { .. })));
    }
}
