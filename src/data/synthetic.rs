use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::batch::{Image, LabelMap, Sample, IGNORE_LABEL};
use crate::data::dataset::Dataset;
use crate::error::DataError;

pub const CHANNELS: usize = 3;
const NOISE: f64 = 0.08;

/// Procedurally generated scenes: a dark background (class 0) with one
/// coloured rectangle per foreground class, plus pixel noise.
///
/// Every sample is a pure function of `(seed, index)`, so train and
/// validation splits are just two instances with different seeds. The
/// outermost pixel ring is labelled [`IGNORE_LABEL`].
#[derive(Debug, Clone)]
pub struct SyntheticScenes {
    len: usize,
    width: usize,
    height: usize,
    n_classes: usize,
    seed: u64,
}

impl SyntheticScenes {
    pub fn new(len: usize, width: usize, height: usize, n_classes: usize, seed: u64) -> SyntheticScenes {
        SyntheticScenes { len, width, height, n_classes, seed }
    }

    /// Mean RGB value of a class. Class 0 is the background.
    pub fn class_color(class: usize, n_classes: usize) -> [f64; 3] {
        if class == 0 {
            return [0.1, 0.1, 0.1];
        }
        let hue = (class - 1) as f64 / (n_classes.max(2) - 1) as f64 * 5.0;
        let x = 1.0 - ((hue % 2.0) - 1.0).abs();
        let (r, g, b) = match hue as usize {
            0 => (1.0, x, 0.0),
            1 => (x, 1.0, 0.0),
            2 => (0.0, 1.0, x),
            3 => (0.0, x, 1.0),
            4 => (x, 0.0, 1.0),
            _ => (1.0, 0.0, x),
        };
        [r, g, b]
    }

    fn rng_for(&self, index: usize) -> StdRng {
        StdRng::seed_from_u64(self.seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ index as u64)
    }
}

impl Dataset for SyntheticScenes {
    fn len(&self) -> usize {
        self.len
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn get(&self, index: usize) -> Result<Sample, DataError> {
        if index >= self.len {
            return Err(DataError::Index { index, len: self.len });
        }
        let (w, h) = (self.width, self.height);
        let mut rng = self.rng_for(index);
        let mut labels = vec![0i64; w * h];

        for class in 1..self.n_classes {
            if !rng.gen_bool(0.8) {
                continue;
            }
            let rw = rng.gen_range(1..=(w / 2).max(1));
            let rh = rng.gen_range(1..=(h / 2).max(1));
            let x0 = rng.gen_range(0..=w - rw);
            let y0 = rng.gen_range(0..=h - rh);
            for y in y0..y0 + rh {
                for x in x0..x0 + rw {
                    labels[y * w + x] = class as i64;
                }
            }
        }

        let mut image = Image::zeros(w, h, CHANNELS);
        for (p, &label) in labels.iter().enumerate() {
            let color = SyntheticScenes::class_color(label as usize, self.n_classes);
            for (value, base) in image.pixel_mut(p).iter_mut().zip(color) {
                *value = base + rng.gen_range(-NOISE..NOISE);
            }
        }

        if w > 2 && h > 2 {
            for y in 0..h {
                for x in 0..w {
                    if x == 0 || y == 0 || x == w - 1 || y == h - 1 {
                        labels[y * w + x] = IGNORE_LABEL;
                    }
                }
            }
        }

        Ok(Sample {
            image,
            label: LabelMap { width: w, height: h, labels },
        })
    }
}
