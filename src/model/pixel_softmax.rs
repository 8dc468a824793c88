use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::batch::Image;
use crate::error::StepError;
use crate::model::segmentation_model::{ClassScores, Mode, SegmentationModel};

pub const ARCH_NAME: &str = "pixel_softmax";

/// Linear classifier applied independently to every pixel's channel vector.
///
/// Parameters are stored flat: `n_classes * in_channels` weights (class-major)
/// followed by `n_classes` biases. Pair it with a softmax cross-entropy loss.
#[derive(Debug, Clone)]
pub struct PixelSoftmax {
    in_channels: usize,
    n_classes: usize,
    params: Vec<f64>,
    mode: Mode,
    // channel vectors of the last training-mode forward, needed by backward
    cached_inputs: Option<Vec<f64>>,
}

#[derive(Serialize, Deserialize)]
struct PixelSoftmaxState {
    arch: String,
    in_channels: usize,
    n_classes: usize,
    params: Vec<f64>,
}

impl PixelSoftmax {
    /// Xavier-initialised weights, zero biases.
    pub fn new(in_channels: usize, n_classes: usize, seed: u64) -> PixelSoftmax {
        let mut rng = StdRng::seed_from_u64(seed);
        let std_dev = (1.0 / in_channels.max(1) as f64).sqrt();
        let mut params: Vec<f64> = (0..n_classes * in_channels)
            .map(|_| sample_standard_normal(&mut rng) * std_dev)
            .collect();
        params.extend(std::iter::repeat(0.0).take(n_classes));

        PixelSoftmax {
            in_channels,
            n_classes,
            params,
            mode: Mode::Train,
            cached_inputs: None,
        }
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn params(&self) -> &[f64] {
        &self.params
    }

    fn weight(&self, class: usize, channel: usize) -> f64 {
        self.params[class * self.in_channels + channel]
    }

    fn bias(&self, class: usize) -> f64 {
        self.params[self.n_classes * self.in_channels + class]
    }
}

/// One draw from N(0, 1) via Box-Muller.
fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    // (0, 1] keeps ln() finite
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = 1.0 - rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

impl SegmentationModel for PixelSoftmax {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn set_mode(&mut self, mode: Mode) {
        if mode == Mode::Eval {
            self.cached_inputs = None;
        }
        self.mode = mode;
    }

    fn forward(&mut self, images: &[Image]) -> Result<ClassScores, StepError> {
        if let Some(img) = images.iter().find(|img| img.channels != self.in_channels) {
            return Err(StepError::Shape(format!(
                "model expects {} channels, image has {}",
                self.in_channels, img.channels
            )));
        }

        let n_pixels: usize = images.iter().map(Image::n_pixels).sum();
        let mut scores = ClassScores::zeros(n_pixels, self.n_classes);
        let mut p = 0;
        for img in images {
            for q in 0..img.n_pixels() {
                let x = img.pixel(q);
                for (class, out) in scores.pixel_mut(p).iter_mut().enumerate() {
                    *out = self.bias(class)
                        + x.iter()
                            .enumerate()
                            .map(|(c, v)| self.weight(class, c) * v)
                            .sum::<f64>();
                }
                p += 1;
            }
        }

        if self.mode == Mode::Train {
            self.cached_inputs = Some(images.iter().flat_map(|img| img.pixels.iter().copied()).collect());
        }
        Ok(scores)
    }

    fn backward(&mut self, grad_output: &ClassScores) -> Result<Vec<f64>, StepError> {
        if self.mode != Mode::Train {
            return Err(StepError::Model("backward called in eval mode".into()));
        }
        let inputs = self
            .cached_inputs
            .take()
            .ok_or_else(|| StepError::Model("backward called before forward".into()))?;

        let n_pixels = inputs.len() / self.in_channels.max(1);
        if grad_output.n_classes != self.n_classes || grad_output.n_pixels() != n_pixels {
            return Err(StepError::Shape(format!(
                "gradient covers {} pixels x {} classes, forward produced {} x {}",
                grad_output.n_pixels(),
                grad_output.n_classes,
                n_pixels,
                self.n_classes
            )));
        }

        let bias_offset = self.n_classes * self.in_channels;
        let mut grads = vec![0.0; self.params.len()];
        for p in 0..n_pixels {
            let x = &inputs[p * self.in_channels..(p + 1) * self.in_channels];
            for (class, g) in grad_output.pixel(p).iter().enumerate() {
                for (c, v) in x.iter().enumerate() {
                    grads[class * self.in_channels + c] += g * v;
                }
                grads[bias_offset + class] += g;
            }
        }
        Ok(grads)
    }

    fn parameters_mut(&mut self) -> &mut [f64] {
        &mut self.params
    }

    fn state(&self) -> Result<Value, StepError> {
        serde_json::to_value(PixelSoftmaxState {
            arch: ARCH_NAME.to_string(),
            in_channels: self.in_channels,
            n_classes: self.n_classes,
            params: self.params.clone(),
        })
        .map_err(|e| StepError::Model(e.to_string()))
    }

    fn load_state(&mut self, state: &Value) -> Result<(), StepError> {
        let state = PixelSoftmaxState::deserialize(state).map_err(|e| StepError::Model(e.to_string()))?;
        if state.arch != ARCH_NAME
            || state.in_channels != self.in_channels
            || state.n_classes != self.n_classes
            || state.params.len() != self.params.len()
        {
            return Err(StepError::Model(format!(
                "saved {} with {} channels and {} classes does not match {} with {} channels and {} classes",
                state.arch, state.in_channels, state.n_classes, ARCH_NAME, self.in_channels, self.n_classes
            )));
        }
        self.params = state.params;
        self.cached_inputs = None;
        Ok(())
    }
}
