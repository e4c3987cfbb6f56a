use std::sync::{Mutex, PoisonError};

use burn::data::dataset::Dataset;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::config::AugmentationConfig;
use crate::dataset::{Cifar10Item, CHANNELS, HEIGHT, WIDTH};

/// 2D point transformation in homogeneous coordinates, used to resample images.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine2d {
    // 3x3 transformation matrix, to be used with column vectors.
    matrix: [[f32; 3]; 3],
}

impl Affine2d {
    pub fn identity() -> Self {
        Self {
            matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    /// Rotation of `theta` radians around `(cx, cy)`.
    pub fn rotation(theta: f32, cx: f32, cy: f32) -> Self {
        let cos_theta = theta.cos();
        let sin_theta = theta.sin();

        Self {
            matrix: [
                [cos_theta, -sin_theta, cx - cos_theta * cx + sin_theta * cy],
                [sin_theta, cos_theta, cy - sin_theta * cx - cos_theta * cy],
                [0.0, 0.0, 1.0],
            ],
        }
    }

    pub fn translation(tx: f32, ty: f32) -> Self {
        Self {
            matrix: [[1.0, 0.0, tx], [0.0, 1.0, ty], [0.0, 0.0, 1.0]],
        }
    }

    /// Mirrors the columns of an image that is `width` pixels wide.
    pub fn horizontal_flip(width: usize) -> Self {
        Self {
            matrix: [
                [-1.0, 0.0, width as f32 - 1.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
        }
    }

    /// Transform applying `other` first, then `self`.
    pub fn mul(&self, other: Affine2d) -> Affine2d {
        let mut matrix = [[0.0f32; 3]; 3];

        for (i, row) in matrix.iter_mut().enumerate() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = self.matrix[i][0] * other.matrix[0][j]
                    + self.matrix[i][1] * other.matrix[1][j]
                    + self.matrix[i][2] * other.matrix[2][j];
            }
        }

        Affine2d { matrix }
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [row_x, row_y, _] = self.matrix;

        (
            row_x[0] * x + row_x[1] * y + row_x[2],
            row_y[0] * x + row_y[1] * y + row_y[2],
        )
    }
}

/// One random draw of the augmentation parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Perturbation {
    /// Rotation in degrees.
    pub angle: f32,
    /// Horizontal shift in pixels.
    pub shift_x: f32,
    /// Vertical shift in pixels.
    pub shift_y: f32,
    pub flip: bool,
}

impl Perturbation {
    pub fn identity() -> Self {
        Self {
            angle: 0.0,
            shift_x: 0.0,
            shift_y: 0.0,
            flip: false,
        }
    }

    /// Draws parameters uniformly inside the configured ranges.
    pub fn sample<R: Rng>(
        config: &AugmentationConfig,
        height: usize,
        width: usize,
        rng: &mut R,
    ) -> Self {
        let mut uniform = |range: f32| {
            if range > 0.0 {
                rng.random_range(-range..=range)
            } else {
                0.0
            }
        };

        let angle = uniform(config.rotation_range);
        let shift_x = uniform(config.width_shift_range) * width as f32;
        let shift_y = uniform(config.height_shift_range) * height as f32;
        let flip = config.horizontal_flip && rng.random_bool(0.5);

        Self {
            angle,
            shift_x,
            shift_y,
            flip,
        }
    }

    /// Maps every output pixel to the source pixel it is sampled from.
    fn sampling_grid(&self, height: usize, width: usize) -> Affine2d {
        let cx = (width as f32 - 1.0) / 2.0;
        let cy = (height as f32 - 1.0) / 2.0;

        let mut mapping = Affine2d::rotation(self.angle.to_radians(), cx, cy)
            .mul(Affine2d::translation(-self.shift_x, -self.shift_y));
        if self.flip {
            mapping = mapping.mul(Affine2d::horizontal_flip(width));
        }

        mapping
    }

    /// Resamples an `[height, width, channels]` image with nearest neighbour lookup.
    ///
    /// Points falling outside of the source are filled with the closest border pixel.
    pub fn apply(&self, image: &[u8], height: usize, width: usize, channels: usize) -> Vec<u8> {
        debug_assert_eq!(image.len(), height * width * channels);

        let mapping = self.sampling_grid(height, width);
        let mut output = vec![0u8; image.len()];

        for y in 0..height {
            for x in 0..width {
                let (sx, sy) = mapping.apply(x as f32, y as f32);
                let sx = sx.round().clamp(0.0, (width - 1) as f32) as usize;
                let sy = sy.round().clamp(0.0, (height - 1) as f32) as usize;

                let target = (y * width + x) * channels;
                let source = (sy * width + sx) * channels;
                output[target..target + channels]
                    .copy_from_slice(&image[source..source + channels]);
            }
        }

        output
    }
}

/// Perturbs every item of the wrapped dataset each time it is accessed.
pub struct AugmentedDataset<D> {
    dataset: D,
    config: AugmentationConfig,
    rng: Mutex<StdRng>,
}

impl<D> AugmentedDataset<D>
where
    D: Dataset<Cifar10Item>,
{
    pub fn new(dataset: D, config: AugmentationConfig, seed: u64) -> Self {
        Self {
            dataset,
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl<D> Dataset<Cifar10Item> for AugmentedDataset<D>
where
    D: Dataset<Cifar10Item>,
{
    fn get(&self, index: usize) -> Option<Cifar10Item> {
        let item = self.dataset.get(index)?;
        let perturbation = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            Perturbation::sample(&self.config, HEIGHT, WIDTH, &mut *rng)
        };

        Some(Cifar10Item {
            image: perturbation.apply(&item.image, HEIGHT, WIDTH, CHANNELS),
            label: item.label,
        })
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}
