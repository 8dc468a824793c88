use crate::data::batch::Batch;
use crate::error::StepError;
use crate::loss::loss_function::LossFunction;
use crate::model::segmentation_model::{Mode, SegmentationModel};
use crate::optim::optimizer::Optimizer;

/// Performs exactly one parameter update on `batch` and returns its loss.
///
/// The model is switched to [`Mode::Train`] first. A non-finite loss is
/// reported before `backward` runs, so a failed step leaves the parameters
/// untouched.
pub fn train_step(
    model: &mut dyn SegmentationModel,
    optimizer: &mut dyn Optimizer,
    loss_fn: &dyn LossFunction,
    batch: &Batch,
) -> Result<f64, StepError> {
    model.set_mode(Mode::Train);

    let scores = model.forward(&batch.images)?;
    let targets = batch.targets();
    if scores.n_pixels() != targets.len() {
        return Err(StepError::Shape(format!(
            "model produced {} pixel scores for {} targets",
            scores.n_pixels(),
            targets.len()
        )));
    }

    let out = loss_fn.compute(&scores, &targets)?;
    if !out.value.is_finite() {
        return Err(StepError::NonFinite { quantity: "loss", value: out.value });
    }

    let grads = model.backward(&out.grad)?;
    if let Some(bad) = grads.iter().copied().find(|g| !g.is_finite()) {
        return Err(StepError::NonFinite { quantity: "gradient", value: bad });
    }
    optimizer.step(model.parameters_mut(), &grads)?;

    Ok(out.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batch::{Image, LabelMap};
    use crate::loss::cross_entropy::CrossEntropy2d;
    use crate::loss::loss_function::LossOutput;
    use crate::model::pixel_softmax::PixelSoftmax;
    use crate::model::segmentation_model::ClassScores;
    use crate::optim::sgd::Sgd;

    fn two_pixel_batch() -> Batch {
        let image = Image::from_pixels(2, 1, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let label = LabelMap { width: 2, height: 1, labels: vec![0, 1] };
        Batch { images: vec![image], labels: vec![label] }
    }

    struct NanLoss;

    impl LossFunction for NanLoss {
        fn name(&self) -> &'static str {
            "nan"
        }

        fn compute(&self, scores: &ClassScores, _targets: &[i64]) -> Result<LossOutput, StepError> {
            Ok(LossOutput {
                value: f64::NAN,
                grad: ClassScores::zeros(scores.n_pixels(), scores.n_classes),
            })
        }
    }

    #[test]
    fn step_updates_parameters_and_lowers_loss() {
        let mut model = PixelSoftmax::new(2, 2, 3);
        let mut sgd = Sgd::new(0.5);
        let batch = two_pixel_batch();
        let before = model.params().to_vec();

        let first = train_step(&mut model, &mut sgd, &CrossEntropy2d, &batch).unwrap();
        assert!(first.is_finite());
        assert_ne!(model.params(), &before[..]);

        let mut last = first;
        for _ in 0..20 {
            last = train_step(&mut model, &mut sgd, &CrossEntropy2d, &batch).unwrap();
        }
        assert!(last < first, "loss did not decrease: {first} -> {last}");
        assert_eq!(model.mode(), Mode::Train);
    }

    #[test]
    fn non_finite_loss_is_an_error_and_leaves_parameters_alone() {
        let mut model = PixelSoftmax::new(2, 2, 3);
        let mut sgd = Sgd::new(0.5);
        let before = model.params().to_vec();

        let err = train_step(&mut model, &mut sgd, &NanLoss, &two_pixel_batch()).unwrap_err();
        assert!(matches!(err, StepError::NonFinite { quantity: "loss", .. }));
        assert_eq!(model.params(), &before[..]);
    }

    #[test]
    fn target_count_mismatch_is_a_shape_error() {
        let mut model = PixelSoftmax::new(2, 2, 3);
        let mut sgd = Sgd::new(0.5);
        let mut batch = two_pixel_batch();
        batch.labels[0].labels.push(1);

        let err = train_step(&mut model, &mut sgd, &CrossEntropy2d, &batch).unwrap_err();
        assert!(matches!(err, StepError::Shape(_)));
    }
}
