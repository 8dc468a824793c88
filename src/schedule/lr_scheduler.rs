use serde_json::Value;

use crate::error::StepError;

/// Epoch-level learning-rate schedule.
pub trait LrScheduler {
    /// Advances the schedule by one completed epoch.
    fn step(&mut self);

    fn learning_rate(&self) -> f64;

    fn state(&self) -> Result<Value, StepError>;

    fn load_state(&mut self, state: &Value) -> Result<(), StepError>;
}
