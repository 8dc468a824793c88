use serde_json::Value;

use crate::data::batch::Image;
use crate::error::StepError;

/// Training mode keeps what `backward` needs; inference mode does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// Per-pixel class scores (logits) for a whole batch.
///
/// Pixels are laid out image by image, row-major inside each image, with
/// `n_classes` consecutive values per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassScores {
    pub n_classes: usize,
    pub values: Vec<f64>,
}

impl ClassScores {
    pub fn zeros(n_pixels: usize, n_classes: usize) -> ClassScores {
        ClassScores {
            n_classes,
            values: vec![0.0; n_pixels * n_classes],
        }
    }

    pub fn n_pixels(&self) -> usize {
        if self.n_classes == 0 {
            0
        } else {
            self.values.len() / self.n_classes
        }
    }

    pub fn pixel(&self, p: usize) -> &[f64] {
        &self.values[p * self.n_classes..(p + 1) * self.n_classes]
    }

    pub fn pixel_mut(&mut self, p: usize) -> &mut [f64] {
        &mut self.values[p * self.n_classes..(p + 1) * self.n_classes]
    }

    /// Highest-scoring class of every pixel.
    pub fn argmax(&self) -> Vec<i64> {
        (0..self.n_pixels())
            .map(|p| {
                self.pixel(p)
                    .iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(k, _)| k as i64)
                    .unwrap_or(0)
            })
            .collect()
    }
}

/// A model producing per-pixel class scores.
///
/// How the model computes its output, or how many devices back it, is its own
/// business; the training loop issues one `forward` (and in training one
/// `backward`) per batch.
pub trait SegmentationModel {
    fn n_classes(&self) -> usize;

    fn mode(&self) -> Mode;

    fn set_mode(&mut self, mode: Mode);

    fn forward(&mut self, images: &[Image]) -> Result<ClassScores, StepError>;

    /// Gradient of the loss w.r.t. the parameters, given the gradient w.r.t.
    /// the last `forward` output. Only valid in [`Mode::Train`].
    fn backward(&mut self, grad_output: &ClassScores) -> Result<Vec<f64>, StepError>;

    fn parameters_mut(&mut self) -> &mut [f64];

    fn state(&self) -> Result<Value, StepError>;

    fn load_state(&mut self, state: &Value) -> Result<(), StepError>;
}
