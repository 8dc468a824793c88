use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Dataset-level scores derived from a confusion matrix at one point in time.
///
/// Per-class entries are `None` when the metric is undefined for that class
/// (no ground-truth pixels for accuracy, empty union for IoU). Undefined
/// entries are left out of every mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    /// Correct pixels / all counted pixels.
    pub overall_acc: f64,
    /// Mean over classes with at least one ground-truth pixel.
    pub mean_acc: f64,
    /// Mean IoU over classes with a defined IoU.
    pub mean_iou: f64,
    /// IoU weighted by each class's share of ground-truth pixels.
    pub freq_weighted_iou: f64,
    pub class_acc: Vec<Option<f64>>,
    pub class_iou: Vec<Option<f64>>,
}

impl ScoreSnapshot {
    pub fn n_classes(&self) -> usize {
        self.class_iou.len()
    }

    /// IoU keyed by class index, for per-class reporting.
    pub fn class_iou_map(&self) -> BTreeMap<usize, Option<f64>> {
        self.class_iou.iter().copied().enumerate().collect()
    }

    /// Classes whose IoU is defined, in index order.
    pub fn defined_iou(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.class_iou
            .iter()
            .enumerate()
            .filter_map(|(k, iou)| iou.map(|v| (k, v)))
    }
}
