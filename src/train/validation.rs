use crate::data::dataset::BatchSource;
use crate::error::StepError;
use crate::loss::loss_function::LossFunction;
use crate::metrics::average_meter::AverageMeter;
use crate::metrics::running_score::RunningScore;
use crate::metrics::score_snapshot::ScoreSnapshot;
use crate::model::segmentation_model::{Mode, SegmentationModel};

/// Result of one full pass over the validation data.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub snapshot: ScoreSnapshot,
    pub val_loss: f64,
    pub n_batches: usize,
}

/// Scores the model on every validation batch exactly once.
///
/// The model is put in [`Mode::Eval`] and its parameters are never touched.
/// Predictions go into `scorer` and batch losses into `val_loss`; both
/// accumulators are read but not reset here, the caller closes the window.
pub fn run_validation(
    model: &mut dyn SegmentationModel,
    loss_fn: &dyn LossFunction,
    data: &mut dyn BatchSource,
    scorer: &mut RunningScore,
    val_loss: &mut AverageMeter,
) -> Result<ValidationOutcome, StepError> {
    model.set_mode(Mode::Eval);

    let mut n_batches = 0;
    for batch in data.batches() {
        let batch = batch?;
        let scores = model.forward(&batch.images)?;
        let targets = batch.targets();

        let out = loss_fn.compute(&scores, &targets)?;
        if !out.value.is_finite() {
            return Err(StepError::NonFinite { quantity: "validation loss", value: out.value });
        }

        scorer.update(&targets, &scores.argmax())?;
        val_loss.update(out.value);
        n_batches += 1;
    }

    if n_batches == 0 {
        return Err(StepError::EmptyValidation);
    }

    Ok(ValidationOutcome {
        snapshot: scorer.scores(),
        val_loss: val_loss.average(),
        n_batches,
    })
}
