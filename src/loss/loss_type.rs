use serde::{Deserialize, Serialize};

use crate::loss::cross_entropy::CrossEntropy2d;
use crate::loss::loss_function::LossFunction;

/// Selects which loss function the training loop uses.
///
/// - `CrossEntropy`: per-pixel softmax cross-entropy with ignore labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    #[default]
    CrossEntropy,
}

impl LossType {
    pub fn build(self) -> Box<dyn LossFunction> {
        match self {
            LossType::CrossEntropy => Box::new(CrossEntropy2d),
        }
    }
}
