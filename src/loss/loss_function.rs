use crate::error::StepError;
use crate::model::segmentation_model::ClassScores;

/// Scalar loss of a batch plus its gradient w.r.t. the model output.
#[derive(Debug, Clone)]
pub struct LossOutput {
    pub value: f64,
    pub grad: ClassScores,
}

pub trait LossFunction {
    fn name(&self) -> &'static str;

    fn compute(&self, scores: &ClassScores, targets: &[i64]) -> Result<LossOutput, StepError>;
}
