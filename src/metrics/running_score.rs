use crate::error::MetricsError;
use crate::metrics::score_snapshot::ScoreSnapshot;

/// Accumulates an N×N confusion matrix over a validation pass.
///
/// Rows are ground-truth classes, columns are predicted classes. Pairs with a
/// label outside `[0, N)` on either side are skipped, which is how void/ignore
/// regions stay out of the scores.
///
/// Scores are computed from the accumulated counts rather than averaged per
/// batch, so classes missing from individual batches are not penalised.
#[derive(Debug, Clone)]
pub struct RunningScore {
    n_classes: usize,
    matrix: Vec<Vec<u64>>,
}

impl RunningScore {
    /// # Panics
    /// Panics if `n_classes == 0`; config validation rejects that earlier.
    pub fn new(n_classes: usize) -> RunningScore {
        assert!(n_classes > 0, "n_classes must be at least 1");
        RunningScore {
            n_classes,
            matrix: vec![vec![0; n_classes]; n_classes],
        }
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn cell(&self, ground_truth: usize, predicted: usize) -> u64 {
        self.matrix[ground_truth][predicted]
    }

    pub fn matrix(&self) -> &[Vec<u64>] {
        &self.matrix
    }

    /// Adds one count per (ground truth, prediction) pair.
    ///
    /// Both slices hold one label per pixel in the same order.
    pub fn update(&mut self, ground_truth: &[i64], predicted: &[i64]) -> Result<(), MetricsError> {
        if ground_truth.len() != predicted.len() {
            return Err(MetricsError::LengthMismatch {
                ground_truth: ground_truth.len(),
                predicted: predicted.len(),
            });
        }

        for (&truth, &pred) in ground_truth.iter().zip(predicted) {
            if let (Some(t), Some(p)) = (self.class_index(truth), self.class_index(pred)) {
                self.matrix[t][p] += 1;
            }
        }
        Ok(())
    }

    fn class_index(&self, label: i64) -> Option<usize> {
        usize::try_from(label).ok().filter(|&k| k < self.n_classes)
    }

    pub fn scores(&self) -> ScoreSnapshot {
        let n = self.n_classes;
        let row_sums: Vec<u64> = self.matrix.iter().map(|row| row.iter().sum()).collect();
        let col_sums: Vec<u64> = (0..n).map(|c| self.matrix.iter().map(|row| row[c]).sum()).collect();
        let diagonal: Vec<u64> = (0..n).map(|k| self.matrix[k][k]).collect();
        let total: u64 = row_sums.iter().sum();
        let correct: u64 = diagonal.iter().sum();

        let overall_acc = ratio(correct, total).unwrap_or(0.0);

        let class_acc: Vec<Option<f64>> = (0..n).map(|k| ratio(diagonal[k], row_sums[k])).collect();

        let class_iou: Vec<Option<f64>> = (0..n)
            .map(|k| ratio(diagonal[k], row_sums[k] + col_sums[k] - diagonal[k]))
            .collect();

        let freq_weighted_iou = if total == 0 {
            0.0
        } else {
            class_iou
                .iter()
                .zip(&row_sums)
                .filter_map(|(iou, &rows)| iou.map(|v| rows as f64 / total as f64 * v))
                .sum()
        };

        ScoreSnapshot {
            overall_acc,
            mean_acc: defined_mean(&class_acc),
            mean_iou: defined_mean(&class_iou),
            freq_weighted_iou,
            class_acc,
            class_iou,
        }
    }

    pub fn reset(&mut self) {
        for row in &mut self.matrix {
            row.iter_mut().for_each(|cell| *cell = 0);
        }
    }
}

fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

/// Mean of the defined entries; `0.0` when none are defined.
fn defined_mean(values: &[Option<f64>]) -> f64 {
    let defined: Vec<f64> = values.iter().flatten().copied().collect();
    if defined.is_empty() {
        0.0
    } else {
        defined.iter().sum::<f64>() / defined.len() as f64
    }
}
