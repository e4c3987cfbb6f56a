use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use burn::data::dataset::{Dataset, InMemDataset};
use burn::data::network::downloader::download_file_as_bytes;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use tar::Archive;

use crate::error::{ExperimentError, Result};
use crate::labels::NUM_CLASSES;

// Binary version of the dataset published by the CIFAR authors.
const URL: &str = "https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz";
const ARCHIVE_DIR: &str = "cifar-10-batches-bin";
const TRAIN_BATCHES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
const TEST_BATCHES: [&str; 1] = ["test_batch.bin"];

pub const WIDTH: usize = 32;
pub const HEIGHT: usize = 32;
pub const CHANNELS: usize = 3;

const PLANE: usize = WIDTH * HEIGHT;
const IMAGE_BYTES: usize = PLANE * CHANNELS;
// One label byte followed by the red, green and blue planes.
const RECORD_BYTES: usize = 1 + IMAGE_BYTES;

/// CIFAR-10 item.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Cifar10Item {
    /// Pixels in height, width, channel order (`HEIGHT * WIDTH * CHANNELS` bytes).
    pub image: Vec<u8>,

    /// Class id of the image.
    pub label: usize,
}

/// The CIFAR-10 dataset consists of 60,000 32x32 color images in 10 classes, with 6,000 images
/// per class. There are 50,000 training images and 10,000 test images.
///
/// The binary archive is downloaded once and cached in the burn-dataset cache directory.
pub struct Cifar10Dataset {
    dataset: InMemDataset<Cifar10Item>,
}

impl Dataset<Cifar10Item> for Cifar10Dataset {
    fn get(&self, index: usize) -> Option<Cifar10Item> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl Cifar10Dataset {
    /// Creates the train split (50,000 images).
    pub fn train() -> Result<Self> {
        Self::new(&TRAIN_BATCHES)
    }

    /// Creates the test split (10,000 images).
    pub fn test() -> Result<Self> {
        Self::new(&TEST_BATCHES)
    }

    /// Creates a split from items that are already in memory.
    pub fn from_items(items: Vec<Cifar10Item>) -> Self {
        Self {
            dataset: InMemDataset::new(items),
        }
    }

    fn new(batches: &[&str]) -> Result<Self> {
        let root = Self::download()?;

        // Train images (u8): 32 * 32 * 3 * 50000 = 153.6Mb
        // Test images (u8): 32 * 32 * 3 * 10000 = 30.72Mb
        let mut items = Vec::new();
        for batch in batches {
            items.extend(read_batch_file(root.join(batch))?);
        }

        Ok(Self::from_items(items))
    }

    /// Download and unpack the binary archive if it is not cached yet.
    ///
    /// Panics if the download cannot be completed.
    fn download() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| {
                ExperimentError::MalformedDataset("could not get cache directory".to_string())
            })?
            .join("burn-dataset")
            .join("cifar10");
        let root = cache_dir.join(ARCHIVE_DIR);

        if root.join(TEST_BATCHES[0]).exists() {
            return Ok(root);
        }

        fs::create_dir_all(&cache_dir).map_err(|err| ExperimentError::io(&cache_dir, err))?;
        log::info!("Downloading CIFAR-10 into {}", cache_dir.display());

        let bytes = download_file_as_bytes(URL, "cifar-10-binary.tar.gz");
        let mut archive = Archive::new(GzDecoder::new(&bytes[..]));
        archive
            .unpack(&cache_dir)
            .map_err(|err| ExperimentError::io(&cache_dir, err))?;

        Ok(root)
    }
}

fn read_batch_file<P: AsRef<Path>>(path: P) -> Result<Vec<Cifar10Item>> {
    let path = path.as_ref();
    let mut bytes = Vec::new();
    File::open(path)
        .and_then(|mut file| file.read_to_end(&mut bytes))
        .map_err(|err| ExperimentError::io(path, err))?;

    parse_records(&bytes)
}

/// Decodes a sequence of binary CIFAR-10 records.
///
/// Each record is a label byte followed by the three color planes, each stored row by row.
pub fn parse_records(bytes: &[u8]) -> Result<Vec<Cifar10Item>> {
    if bytes.len() % RECORD_BYTES != 0 {
        return Err(ExperimentError::MalformedDataset(format!(
            "{} bytes is not a whole number of {RECORD_BYTES} byte records",
            bytes.len()
        )));
    }

    bytes
        .chunks_exact(RECORD_BYTES)
        .map(|record| {
            let label = record[0] as usize;
            if label >= NUM_CLASSES {
                return Err(ExperimentError::MalformedDataset(format!(
                    "label {label} is outside of the {NUM_CLASSES} classes"
                )));
            }

            Ok(Cifar10Item {
                image: planar_to_interleaved(&record[1..]),
                label,
            })
        })
        .collect()
}

/// Converts `[C, H, W]` planes to `[H, W, C]` pixels.
fn planar_to_interleaved(planes: &[u8]) -> Vec<u8> {
    debug_assert_eq!(planes.len(), IMAGE_BYTES);

    let mut pixels = vec![0u8; IMAGE_BYTES];
    for (channel, plane) in planes.chunks_exact(PLANE).enumerate() {
        for (position, value) in plane.iter().enumerate() {
            pixels[position * CHANNELS + channel] = *value;
        }
    }

    pixels
}
