use serde_json::Value;

use crate::error::StepError;

/// Applies parameter updates from gradients.
pub trait Optimizer {
    /// One update of `params` in place.
    fn step(&mut self, params: &mut [f64], grads: &[f64]) -> Result<(), StepError>;

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, lr: f64);

    fn state(&self) -> Result<Value, StepError>;

    fn load_state(&mut self, state: &Value) -> Result<(), StepError>;
}
