use crate::error::StepError;
use crate::loss::loss_function::{LossFunction, LossOutput};
use crate::model::segmentation_model::ClassScores;

/// Softmax cross-entropy over every pixel of a batch.
///
/// Pixels whose target lies outside `[0, n_classes)` (e.g. the 250 ignore
/// label) contribute neither loss nor gradient. The loss is averaged over the
/// remaining pixels; a batch without any valid pixel has loss 0.
pub struct CrossEntropy2d;

impl CrossEntropy2d {
    /// Numerically stable log-softmax of one pixel's logits.
    fn log_softmax(logits: &[f64]) -> Vec<f64> {
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let log_sum = logits.iter().map(|z| (z - max).exp()).sum::<f64>().ln() + max;
        logits.iter().map(|z| z - log_sum).collect()
    }
}

impl LossFunction for CrossEntropy2d {
    fn name(&self) -> &'static str {
        "cross_entropy"
    }

    /// Returns the mean loss and its gradient w.r.t. the logits:
    ///   ∂L/∂z_k = (softmax(z)_k - [k == target]) / n_valid
    fn compute(&self, scores: &ClassScores, targets: &[i64]) -> Result<LossOutput, StepError> {
        let n_pixels = scores.n_pixels();
        if targets.len() != n_pixels {
            return Err(StepError::Shape(format!(
                "{} targets for {} predicted pixels",
                targets.len(),
                n_pixels
            )));
        }

        let n_classes = scores.n_classes;
        let valid = |t: i64| usize::try_from(t).ok().filter(|&k| k < n_classes);
        let n_valid = targets.iter().filter(|&&t| valid(t).is_some()).count();

        let mut grad = ClassScores::zeros(n_pixels, n_classes);
        if n_valid == 0 {
            return Ok(LossOutput { value: 0.0, grad });
        }

        let scale = 1.0 / n_valid as f64;
        let mut total = 0.0;
        for (p, &t) in targets.iter().enumerate() {
            let Some(target) = valid(t) else {
                continue;
            };
            let log_probs = CrossEntropy2d::log_softmax(scores.pixel(p));
            total -= log_probs[target];
            for (k, (g, lp)) in grad.pixel_mut(p).iter_mut().zip(&log_probs).enumerate() {
                let indicator = if k == target { 1.0 } else { 0.0 };
                *g = (lp.exp() - indicator) * scale;
            }
        }

        Ok(LossOutput { value: total * scale, grad })
    }
}
